//! Live ranges: liveness plus the definitions that bound it.

use super::blocks::{IsLive, LivenessVec};
use super::boundary::Boundary;
use super::tracker::{FieldLiveness, UseKind};
use crate::ir::{Block, FunctionBody, Module, Type, Value};
use crate::leaf::{leaf_count, LeafBits, LeafRange};
use crate::options::LivenessOptions;

/// The definitions of a live range. Implemented by the single-def
/// (`SsaDef`) and multi-def (`MultiDefs`) variants; everything else
/// about a live range is shared in `FieldLiveRange`.
pub trait DefSet {
    fn is_initialized(&self) -> bool;

    /// Forget all definitions.
    fn reset(&mut self);

    /// Whether `def` (an instruction or block parameter) defines `bit`.
    fn is_def(&self, def: Value, bit: usize) -> bool;

    fn is_def_block(&self, block: Block, bit: usize) -> bool;

    /// Whether `user` reads `bit` before the local definition of `bit`
    /// in the same block, so that the value flowing in from
    /// predecessors is the one used.
    fn is_user_before_def(&self, body: &FunctionBody, user: Value, bit: usize) -> bool;

    /// Hook run for every recorded user before liveness is updated.
    fn check_user(&self, _body: &FunctionBody, _user: Value) {}

    /// Record the boundary facts of `bit` inside `block`. `is_live_out`
    /// tells whether the block is `LiveOut` for `bit`.
    fn find_boundaries_in_block(
        &self,
        body: &FunctionBody,
        liveness: &FieldLiveness,
        block: Block,
        bit: usize,
        is_live_out: bool,
        boundary: &mut Boundary,
    );
}

/// Pruned field-sensitive live range of one root value over `body`.
#[derive(Clone, Debug)]
pub struct FieldLiveRange<'a, D: DefSet> {
    pub(crate) body: &'a FunctionBody,
    pub(crate) options: LivenessOptions,
    pub(crate) liveness: FieldLiveness,
    pub(crate) defs: D,
}

impl<'a, D: DefSet> FieldLiveRange<'a, D> {
    pub(crate) fn with_defs(
        body: &'a FunctionBody,
        num_bits: usize,
        options: LivenessOptions,
        defs: D,
    ) -> Self {
        FieldLiveRange {
            body,
            options,
            liveness: FieldLiveness::new(num_bits),
            defs,
        }
    }

    pub fn body(&self) -> &'a FunctionBody {
        self.body
    }

    pub fn options(&self) -> &LivenessOptions {
        &self.options
    }

    pub fn num_bits(&self) -> usize {
        self.liveness.num_bits()
    }

    pub fn liveness(&self) -> &FieldLiveness {
        &self.liveness
    }

    pub fn defs(&self) -> &D {
        &self.defs
    }

    pub fn is_initialized(&self) -> bool {
        self.liveness.is_initialized() && self.defs.is_initialized()
    }

    pub fn discovered_blocks(&self) -> &[Block] {
        self.liveness.discovered_blocks()
    }

    pub fn block_liveness(&self, block: Block, bit: usize) -> IsLive {
        self.liveness.block_liveness(block, bit)
    }

    pub fn interesting_user(&self, inst: Value, bit: usize) -> Option<UseKind> {
        self.liveness.interesting_user(inst, bit)
    }

    /// Drop all definitions and uses and start over for a root value of
    /// type `ty`.
    pub fn reset(&mut self, module: &Module, ty: Type) {
        self.reset_bits(leaf_count(module, ty));
    }

    pub fn reset_bits(&mut self, num_bits: usize) {
        log::debug!("live range: reset to {} bits", num_bits);
        self.liveness.reset(num_bits);
        self.defs.reset();
    }

    fn use_before_def_bits(&self, user: Value, bits: impl Iterator<Item = usize>) -> LeafBits {
        let mut use_before_def = LeafBits::new(self.num_bits());
        let block = self.body.value_blocks[user];
        for bit in bits {
            if self.defs.is_user_before_def(self.body, user, bit) {
                assert!(
                    !self.body.blocks[block].preds.is_empty(),
                    "internal error: {} uses bit {} before its def in {} with no predecessors",
                    user,
                    bit,
                    block
                );
                use_before_def.set(bit);
            }
        }
        use_before_def
    }

    /// The instruction standing for `value` in its block: results of
    /// multi-result instructions map to the instruction.
    fn inst_of(&self, value: Value) -> Value {
        self.body.defining_inst(value).unwrap_or(value)
    }

    fn check_user(&self, user: Value) {
        assert!(
            self.is_initialized(),
            "internal error: use {} recorded before definitions were initialized",
            user
        );
        self.defs.check_user(self.body, user);
    }

    pub fn update_for_use(&mut self, user: Value, range: LeafRange, lifetime_ending: bool) {
        let user = self.inst_of(user);
        self.check_user(user);
        let use_before_def = self.use_before_def_bits(user, range.iter());
        self.liveness
            .update_for_use(self.body, user, range, lifetime_ending, &use_before_def);
    }

    pub fn update_for_use_bits(&mut self, user: Value, bits: &LeafBits, lifetime_ending: bool) {
        let user = self.inst_of(user);
        self.check_user(user);
        let use_before_def = self.use_before_def_bits(user, bits.iter_ones());
        self.liveness
            .update_for_use_bits(self.body, user, bits, lifetime_ending, &use_before_def);
    }

    pub fn extend_to_non_use(&mut self, user: Value, range: LeafRange) {
        let user = self.inst_of(user);
        self.check_user(user);
        let use_before_def = self.use_before_def_bits(user, range.iter());
        self.liveness
            .extend_to_non_use(self.body, user, range, &use_before_def);
    }

    pub fn extend_to_non_use_bits(&mut self, user: Value, bits: &LeafBits) {
        let user = self.inst_of(user);
        self.check_user(user);
        let use_before_def = self.use_before_def_bits(user, bits.iter_ones());
        self.liveness
            .extend_to_non_use_bits(self.body, user, bits, &use_before_def);
    }

    /// Whether `inst` is inside the live range of any bit of `range`:
    /// its block is live out without defining the bit, or walking up
    /// from the block's end reaches `inst` after a user and before a
    /// def. A result of a multi-result instruction is queried at the
    /// instruction.
    pub fn is_within_boundary(&self, inst: Value, range: LeafRange) -> bool {
        assert!(self.is_initialized());
        if range.is_empty() {
            return true;
        }
        let inst = self.inst_of(inst);

        let block = self.body.value_blocks[inst];
        let mut states = LivenessVec::new();
        self.liveness
            .live_blocks()
            .get_range(block, range, &mut states);

        for (bit, &state) in range.iter().zip(states.iter()) {
            let mut is_live = match state {
                IsLive::Dead => continue,
                IsLive::LiveOut if !self.defs.is_def_block(block, bit) => {
                    log::trace!("is_within_boundary: {} live out of non-def {}", inst, block);
                    return true;
                }
                IsLive::LiveOut => true,
                IsLive::LiveWithin => false,
            };

            let mut found = false;
            for &block_inst in self.body.blocks[block].insts.iter().rev() {
                if self.defs.is_def(block_inst, bit) {
                    is_live = false;
                }
                if block_inst == inst {
                    if is_live {
                        log::trace!("is_within_boundary: {} live at bit {}", inst, bit);
                        return true;
                    }
                    found = true;
                    break;
                }
                if !is_live {
                    is_live = self.liveness.is_interesting_user(block_inst, bit);
                }
            }
            assert!(
                found,
                "internal error: {} is not in its block {}",
                inst, block
            );
        }

        false
    }

    pub fn compute_boundary(&self) -> Boundary {
        let mut boundary = Boundary::new(self.num_bits());
        self.compute_boundary_into(&mut boundary);
        boundary
    }

    /// Add this range's boundary facts to `boundary`.
    pub fn compute_boundary_into(&self, boundary: &mut Boundary) {
        assert!(self.is_initialized());
        assert_eq!(boundary.num_bits(), self.num_bits());
        log::debug!(
            "computing boundary over {} discovered blocks",
            self.discovered_blocks().len()
        );

        let live_blocks = self.liveness.live_blocks();
        let mut states = LivenessVec::new();
        for &block in self.discovered_blocks() {
            live_blocks.get_all(block, &mut states);
            let mut found_any_non_dead = false;
            for (bit, &state) in states.iter().enumerate() {
                match state {
                    IsLive::Dead => {}
                    IsLive::LiveOut => {
                        for &succ in &self.body.blocks[block].succs {
                            if live_blocks.get(succ, bit) == IsLive::Dead {
                                log::trace!("boundary: edge into {} for bit {}", succ, bit);
                                boundary.boundary_edge_bits_mut(succ).set(bit);
                            }
                        }
                        self.defs.find_boundaries_in_block(
                            self.body,
                            &self.liveness,
                            block,
                            bit,
                            true,
                            boundary,
                        );
                        found_any_non_dead = true;
                    }
                    IsLive::LiveWithin => {
                        self.defs.find_boundaries_in_block(
                            self.body,
                            &self.liveness,
                            block,
                            bit,
                            false,
                            boundary,
                        );
                        found_any_non_dead = true;
                    }
                }
            }
            assert!(
                found_any_non_dead,
                "internal error: discovered {} is dead for every bit",
                block
            );
        }
    }
}

impl<'a, D: DefSet> std::fmt::Display for FieldLiveRange<'a, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.liveness)
    }
}
