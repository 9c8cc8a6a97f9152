//! Fuzzing-specific utilities.

use crate::cfg::CFGInfo;
use crate::entity::EntityRef;
use crate::ir::{Block, BlockTarget, FunctionBody, Module, Operator, Terminator, Type, Value};
use crate::leaf::LeafRange;
use crate::liveness::{Boundary, IsLive, MultiDefLiveRange};
use crate::options::LivenessOptions;
use libfuzzer_sys::arbitrary::{self, Arbitrary, Unstructured};

#[derive(Clone, Debug)]
pub struct ArbitraryUse {
    pub user: Value,
    pub range: LeafRange,
    pub lifetime_ending: bool,
    pub non_use: bool,
}

/// An arbitrary CFG with a root value defined at the top of the entry
/// block, further arbitrary (re)definitions, and arbitrary uses in
/// reachable blocks.
#[derive(Clone, Debug)]
pub struct LivenessCase {
    pub module: Module,
    pub body: FunctionBody,
    pub root_ty: Type,
    pub defs: Vec<(Value, LeafRange)>,
    pub uses: Vec<ArbitraryUse>,
}

fn arbitrary_range(u: &mut Unstructured, num_bits: usize) -> arbitrary::Result<LeafRange> {
    let start = u.int_in_range(0..=num_bits - 1)?;
    let end = u.int_in_range(start + 1..=num_bits)?;
    Ok(LeafRange::new(start, end))
}

impl<'a> Arbitrary<'a> for LivenessCase {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        let mut module = Module::empty();
        let int = module.scalar("Int");
        let num_bits: usize = u.int_in_range(1..=4)?;
        let root_ty = if num_bits == 1 {
            int
        } else {
            module.tuple(vec![int; num_bits])
        };

        let num_blocks: usize = u.int_in_range(1..=8)?;
        let mut body = FunctionBody::new();
        for _ in 1..num_blocks {
            body.add_block();
        }
        let params = (0..num_blocks)
            .map(|i| body.add_blockparam(Block::new(i), int))
            .collect::<Vec<_>>();

        let root = body.add_inst(body.entry, Operator::AllocStack, vec![], vec![root_ty]);
        let mut insts = vec![];
        for i in 0..num_blocks {
            let count: usize = u.int_in_range(0..=4)?;
            for j in 0..count {
                let callee = format!("f{}_{}", i, j);
                insts.push(body.add_inst(
                    Block::new(i),
                    Operator::Apply { callee },
                    vec![root],
                    vec![],
                ));
            }
        }

        let mut succs = vec![vec![]; num_blocks];
        let num_edges: usize = u.int_in_range(0..=16)?;
        for _ in 0..num_edges {
            let from: usize = u.int_in_range(0..=num_blocks - 1)?;
            let to: usize = u.int_in_range(0..=num_blocks - 1)?;
            succs[from].push(Block::new(to));
        }
        for (i, dests) in succs.into_iter().enumerate() {
            let param = params[i];
            let mut targets = dests
                .into_iter()
                .map(|block| BlockTarget {
                    block,
                    args: vec![param],
                })
                .collect::<Vec<_>>();
            let terminator = match targets.len() {
                0 => Terminator::Return { values: vec![] },
                1 => Terminator::Br {
                    target: targets.remove(0),
                },
                2 => {
                    let if_false = targets.remove(1);
                    let if_true = targets.remove(0);
                    Terminator::CondBr {
                        cond: param,
                        if_true,
                        if_false,
                    }
                }
                _ => {
                    let default = targets.pop().unwrap();
                    Terminator::Switch {
                        value: param,
                        targets,
                        default,
                    }
                }
            };
            body.set_terminator(Block::new(i), terminator);
        }
        body.validate().unwrap();

        let mut defs = vec![(root, LeafRange::new(0, num_bits))];
        let def_candidates = insts
            .iter()
            .chain(params.iter())
            .copied()
            .collect::<Vec<_>>();
        if !def_candidates.is_empty() {
            let num_defs: usize = u.int_in_range(0..=4)?;
            for _ in 0..num_defs {
                let def = *u.choose(&def_candidates[..])?;
                defs.push((def, arbitrary_range(u, num_bits)?));
            }
        }

        // Uses only in reachable blocks: every reachable block other
        // than the entry has predecessors, and the entry's root def
        // precedes all of its users.
        let cfg = CFGInfo::new(&body);
        let use_candidates = insts
            .iter()
            .copied()
            .filter(|&inst| cfg.is_reachable(body.value_blocks[inst]))
            .collect::<Vec<_>>();
        let mut uses = vec![];
        if !use_candidates.is_empty() {
            let num_uses: usize = u.int_in_range(0..=8)?;
            for _ in 0..num_uses {
                uses.push(ArbitraryUse {
                    user: *u.choose(&use_candidates[..])?,
                    range: arbitrary_range(u, num_bits)?,
                    lifetime_ending: u.arbitrary()?,
                    non_use: u.ratio(1, 4)?,
                });
            }
        }

        Ok(LivenessCase {
            module,
            body,
            root_ty,
            defs,
            uses,
        })
    }
}

/// Run the multi-def analysis over `case` and check its invariants:
/// block states only move up, every live-within block holds a
/// boundary fact for its bit, every dead successor of a live-out block
/// starts with a boundary edge, and the boundary is stable.
pub fn check_invariants(case: &LivenessCase) {
    let mut range = MultiDefLiveRange::new(
        &case.module,
        &case.body,
        case.root_ty,
        LivenessOptions::default(),
    );
    for &(def, leaves) in &case.defs {
        range.initialize_def_value(def, leaves);
    }
    range.finished_initialization_of_defs();

    let num_bits = range.num_bits();
    let snapshot = |range: &MultiDefLiveRange| {
        case.body
            .blocks
            .iter()
            .flat_map(|block| (0..num_bits).map(move |bit| (block, bit)))
            .map(|(block, bit)| range.block_liveness(block, bit))
            .collect::<Vec<_>>()
    };

    for recorded in &case.uses {
        let before = snapshot(&range);
        if recorded.non_use {
            range.extend_to_non_use(recorded.user, recorded.range);
        } else {
            range.update_for_use(recorded.user, recorded.range, recorded.lifetime_ending);
        }
        let after = snapshot(&range);
        for (old, new) in before.iter().zip(after.iter()) {
            assert!(old <= new, "liveness regressed from {} to {}", old, new);
        }
        let _ = range.is_within_boundary(recorded.user, recorded.range);
    }

    let boundary = range.compute_boundary();
    assert_eq!(boundary, range.compute_boundary());

    for &block in range.discovered_blocks() {
        for bit in 0..num_bits {
            match range.block_liveness(block, bit) {
                IsLive::Dead => {}
                IsLive::LiveWithin => {
                    let has_fact = has_boundary_fact(&case.body, &boundary, block, bit);
                    assert!(
                        has_fact,
                        "{} is live within for bit {} without a boundary",
                        block, bit
                    );
                }
                IsLive::LiveOut => {
                    for &succ in &case.body.blocks[block].succs {
                        if range.block_liveness(succ, bit) == IsLive::Dead {
                            assert!(
                                boundary.is_boundary_edge(succ, bit),
                                "dead successor {} of {} has no boundary edge for bit {}",
                                succ,
                                block,
                                bit
                            );
                        }
                    }
                }
            }
        }
    }
}

/// Whether `block` holds a last user or a dead def of `bit`.
pub fn has_boundary_fact(
    body: &FunctionBody,
    boundary: &Boundary,
    block: Block,
    bit: usize,
) -> bool {
    let def = &body.blocks[block];
    let is_fact = |v: Value| boundary.is_last_user(v, bit) || boundary.is_dead_def(v, bit);
    def.insts.iter().any(|&inst| is_fact(inst))
        || def.params.iter().any(|&(_, param)| is_fact(param))
}
