//! Live ranges with any number of definitions, e.g. of memory
//! locations that are reinitialized.

use super::blocks::IsLive;
use super::boundary::{find_boundary_in_non_def_block, find_boundary_in_ssa_def_block, Boundary};
use super::range::{DefSet, FieldLiveRange};
use super::tracker::{FieldLiveness, UseKind};
use crate::entity::EntityRef;
use crate::ir::{Block, FunctionBody, Module, Type, Value};
use crate::leaf::{leaf_count, LeafRange};
use crate::options::LivenessOptions;
use fxhash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::collections::VecDeque;

type Ranges = SmallVec<[LeafRange; 2]>;

/// Every definition of a multi-def live range, keyed by defining
/// instruction or block parameter, and by block.
#[derive(Clone, Debug, Default)]
pub struct MultiDefs {
    defs: FxHashMap<Value, Ranges>,
    def_blocks: FxHashMap<Block, Ranges>,
    finished: bool,
}

impl MultiDefs {
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Ranges defined by `def`.
    pub fn ranges(&self, def: Value) -> &[LeafRange] {
        self.defs.get(&def).map_or(&[], |ranges| &ranges[..])
    }

    fn add(&mut self, def: Value, block: Block, range: LeafRange) {
        assert!(
            !self.finished,
            "internal error: def {} added after initialization finished",
            def
        );
        self.defs.entry(def).or_default().push(range);
        self.def_blocks.entry(block).or_default().push(range);
    }
}

impl DefSet for MultiDefs {
    fn is_initialized(&self) -> bool {
        self.finished
    }

    fn reset(&mut self) {
        self.defs.clear();
        self.def_blocks.clear();
        self.finished = false;
    }

    fn is_def(&self, def: Value, bit: usize) -> bool {
        self.defs
            .get(&def)
            .map_or(false, |ranges| ranges.iter().any(|r| r.contains(bit)))
    }

    fn is_def_block(&self, block: Block, bit: usize) -> bool {
        self.def_blocks
            .get(&block)
            .map_or(false, |ranges| ranges.iter().any(|r| r.contains(bit)))
    }

    fn is_user_before_def(&self, body: &FunctionBody, user: Value, bit: usize) -> bool {
        let user = body.defining_inst(user).unwrap_or(user);
        let block = body.value_blocks[user];
        if !self.is_def_block(block, bit) {
            return false;
        }
        if body.blocks[block]
            .params
            .iter()
            .any(|&(_, param)| self.is_def(param, bit))
        {
            return false;
        }

        // A user that is also a def reads the incoming value.
        let insts = &body.blocks[block].insts;
        let index = body
            .inst_index(user)
            .unwrap_or_else(|| panic!("internal error: {} is not in its block {}", user, block));
        !insts[..index].iter().any(|&inst| self.is_def(inst, bit))
    }

    fn find_boundaries_in_block(
        &self,
        body: &FunctionBody,
        liveness: &FieldLiveness,
        block: Block,
        bit: usize,
        is_live_out: bool,
        boundary: &mut Boundary,
    ) {
        log::trace!(
            "multi-def boundary: {} bit {} live out: {}",
            block,
            bit,
            is_live_out
        );

        if !self.is_def_block(block, bit) {
            // A live-out block with no defs cannot hold a boundary.
            if !is_live_out {
                find_boundary_in_non_def_block(body, block, bit, boundary, liveness);
            }
            return;
        }

        if self.defs.len() == 1 {
            if is_live_out {
                return;
            }
            if let Some((&def, ranges)) = self.defs.iter().next() {
                debug_assert!(ranges.iter().any(|r| r.contains(bit)));
                find_boundary_in_ssa_def_block(body, def, bit, boundary, liveness);
            }
            return;
        }

        let prev_count = boundary.num_last_users_and_dead_defs(bit);
        let mut is_live = is_live_out;
        for &inst in body.blocks[block].insts.iter().rev() {
            // Defs first: one instruction may be both a dead def and a
            // last user of the same bit.
            if self.is_def(inst, bit) {
                if !is_live {
                    log::trace!("multi-def boundary: dead def {} bit {}", inst, bit);
                    boundary.dead_def_bits_mut(inst).set(bit);
                }
                is_live = false;
            }
            if !is_live && liveness.is_interesting_user(inst, bit) {
                log::trace!("multi-def boundary: last user {} bit {}", inst, bit);
                boundary.last_user_bits_mut(inst).set(bit);
                is_live = true;
            }
        }

        if !is_live {
            for &(_, param) in &body.blocks[block].params {
                if self.is_def(param, bit) {
                    log::trace!("multi-def boundary: dead param {} bit {}", param, bit);
                    boundary.dead_def_bits_mut(param).set(bit);
                }
            }

            // Values live out of predecessors die on entry here.
            let preds = &body.blocks[block].preds;
            let is_live_out_of =
                |pred: Block| liveness.block_liveness(pred, bit) == IsLive::LiveOut;
            if !preds.is_empty() && preds.iter().all(|&pred| is_live_out_of(pred)) {
                boundary.boundary_edge_bits_mut(block).set(bit);
            } else {
                for &pred in preds.iter().filter(|&&pred| is_live_out_of(pred)) {
                    log::trace!(
                        "multi-def boundary: split edge {} -> {} bit {}",
                        pred,
                        block,
                        bit
                    );
                    boundary.split_edge_bits_mut(pred, block).set(bit);
                }
            }
        }

        assert!(
            is_live_out || prev_count < boundary.num_last_users_and_dead_defs(bit),
            "internal error: live-within {} has no boundary for bit {}",
            block,
            bit
        );
    }
}

pub type MultiDefLiveRange<'a> = FieldLiveRange<'a, MultiDefs>;

impl<'a> FieldLiveRange<'a, MultiDefs> {
    /// A live range for a root value of type `ty`. Definitions are
    /// added with `initialize_def_inst`/`initialize_def_value`, then
    /// sealed with `finished_initialization_of_defs` before any use is
    /// recorded.
    pub fn new(
        module: &Module,
        body: &'a FunctionBody,
        ty: Type,
        options: LivenessOptions,
    ) -> MultiDefLiveRange<'a> {
        FieldLiveRange::with_defs(body, leaf_count(module, ty), options, MultiDefs::default())
    }

    fn add_def(&mut self, def: Value, range: LeafRange) {
        assert!(range.end <= self.num_bits());
        let block = self.body.value_blocks[def];
        assert!(
            block.is_valid(),
            "internal error: def {} is not placed in a block",
            def
        );
        log::trace!(
            "multi-def live range: def {} in {} over {}",
            def,
            block,
            range
        );
        self.defs.add(def, block, range);
        self.liveness.initialize_def_block(block, range);
    }

    /// Add an instruction defining `range`.
    pub fn initialize_def_inst(&mut self, inst: Value, range: LeafRange) {
        assert!(
            self.body.defining_inst(inst) == Some(inst),
            "internal error: {} is not an instruction",
            inst
        );
        self.add_def(inst, range);
    }

    /// Add a value defining `range`: a block parameter, or an
    /// instruction result (the instruction becomes the def).
    pub fn initialize_def_value(&mut self, value: Value, range: LeafRange) {
        let def = self.body.defining_inst(value).unwrap_or(value);
        self.add_def(def, range);
    }

    pub fn finished_initialization_of_defs(&mut self) {
        self.defs.finished = true;
    }

    pub fn is_user_before_def(&self, user: Value, bit: usize) -> bool {
        self.defs.is_user_before_def(self.body, user, bit)
    }

    /// Search backwards from `inst` (or the instruction producing it)
    /// for lifetime-ending uses of `bit`, stopping at defs. `callback`
    /// sees each consuming use found and returns `false` to stop the
    /// search, in which case this returns `false`; otherwise returns
    /// `true`.
    pub fn find_earlier_consuming_use<F: FnMut(Value) -> bool>(
        &self,
        inst: Value,
        bit: usize,
        mut callback: F,
    ) -> bool {
        enum Scan {
            FoundDef,
            Aborted,
            Continue,
        }

        let body = self.body;
        let mut scan = |insts: &[Value], block: Block| -> Scan {
            for &inst in insts.iter().rev() {
                if self.defs.is_def(inst, bit) {
                    log::trace!("earlier consuming use: def {}", inst);
                    return Scan::FoundDef;
                }
                if self.liveness.interesting_user(inst, bit) == Some(UseKind::LifetimeEnding) {
                    log::trace!("earlier consuming use: {}", inst);
                    if !callback(inst) {
                        return Scan::Aborted;
                    }
                }
            }
            if body.blocks[block]
                .params
                .iter()
                .any(|&(_, param)| self.defs.is_def(param, bit))
            {
                return Scan::FoundDef;
            }
            Scan::Continue
        };

        let inst = body.defining_inst(inst).unwrap_or(inst);
        let start = body.value_blocks[inst];
        let index = body
            .inst_index(inst)
            .unwrap_or_else(|| panic!("internal error: {} is not in its block {}", inst, start));
        match scan(&body.blocks[start].insts[..index], start) {
            Scan::FoundDef => return true,
            Scan::Aborted => return false,
            Scan::Continue => {}
        }

        let mut workqueue = VecDeque::new();
        let mut visited = FxHashSet::default();
        for &pred in &body.blocks[start].preds {
            if visited.insert(pred) {
                workqueue.push_back(pred);
            }
        }
        while let Some(block) = workqueue.pop_front() {
            match scan(&body.blocks[block].insts[..], block) {
                Scan::FoundDef => return true,
                Scan::Aborted => return false,
                Scan::Continue => {}
            }
            for &pred in &body.blocks[block].preds {
                if visited.insert(pred) {
                    workqueue.push_back(pred);
                }
            }
        }

        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::{Operator, Terminator};

    #[test]
    fn user_before_def() {
        let _ = env_logger::try_init();
        let mut module = Module::empty();
        let int = module.scalar("Int");
        let mut body = FunctionBody::new();
        let entry = body.entry;
        let addr = body.add_inst(entry, Operator::AllocStack, vec![], vec![int]);
        let load = body.add_inst(entry, Operator::Load { take: true }, vec![addr], vec![int]);
        let store = body.add_inst(entry, Operator::Store, vec![load, addr], vec![]);
        let destroy = body.add_inst(entry, Operator::DestroyAddr, vec![addr], vec![]);
        body.set_terminator(entry, Terminator::Return { values: vec![] });

        let mut range = MultiDefLiveRange::new(&module, &body, int, LivenessOptions::default());
        range.initialize_def_inst(store, LeafRange::single(0));
        range.finished_initialization_of_defs();

        assert!(range.is_user_before_def(load, 0));
        assert!(range.is_user_before_def(store, 0));
        assert!(!range.is_user_before_def(destroy, 0));
    }
}
