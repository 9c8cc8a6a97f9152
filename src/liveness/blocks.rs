//! Per-block, per-leaf liveness state and its backward propagation.

use crate::entity::Slots;
use crate::ir::{Block, FunctionBody};
use crate::leaf::{LeafBits, LeafRange};
use bitvec::vec::BitVec;
use fxhash::FxHashSet;
use smallvec::SmallVec;
use std::collections::VecDeque;

/// Liveness of one leaf in one block. Ordered: a block's state only
/// ever moves up this order during an analysis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IsLive {
    Dead,
    /// Live somewhere inside the block but not out of it.
    LiveWithin,
    /// Live out of the block along every successor edge.
    LiveOut,
}

impl IsLive {
    fn from_bits(live: bool, live_out: bool) -> IsLive {
        match (live, live_out) {
            (false, _) => IsLive::Dead,
            (true, false) => IsLive::LiveWithin,
            (true, true) => IsLive::LiveOut,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IsLive::Dead => "Dead",
            IsLive::LiveWithin => "LiveWithin",
            IsLive::LiveOut => "LiveOut",
        }
    }
}

impl std::fmt::Display for IsLive {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type LivenessVec = SmallVec<[IsLive; 8]>;

/// Dense liveness state for every block discovered so far.
///
/// Blocks get a slot the first time any of their leaves becomes live;
/// each slot holds two bits (live, live-out) per leaf. Blocks that were
/// never discovered are `Dead` for every leaf.
#[derive(Clone, Debug, Default)]
pub struct LiveBlocks {
    num_bits: usize,
    blocks: Slots<Block>,
    states: BitVec,
}

impl LiveBlocks {
    pub fn new(num_bits: usize) -> LiveBlocks {
        LiveBlocks {
            num_bits,
            ..LiveBlocks::default()
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.num_bits > 0
    }

    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    /// Forget all state and start over with `num_bits` leaves.
    pub fn reset(&mut self, num_bits: usize) {
        self.num_bits = num_bits;
        self.blocks.clear();
        self.states.clear();
    }

    /// Blocks with any live leaf, in the order they were first marked.
    pub fn discovered_blocks(&self) -> &[Block] {
        self.blocks.order()
    }

    fn state_index(&self, slot: usize, bit: usize) -> usize {
        debug_assert!(bit < self.num_bits);
        (slot * self.num_bits + bit) * 2
    }

    pub fn get(&self, block: Block, bit: usize) -> IsLive {
        match self.blocks.get(block) {
            None => IsLive::Dead,
            Some(slot) => {
                let index = self.state_index(slot, bit);
                IsLive::from_bits(self.states[index], self.states[index + 1])
            }
        }
    }

    pub fn get_range(&self, block: Block, range: LeafRange, out: &mut LivenessVec) {
        out.clear();
        out.extend(range.iter().map(|bit| self.get(block, bit)));
    }

    pub fn get_all(&self, block: Block, out: &mut LivenessVec) {
        self.get_range(block, LeafRange::new(0, self.num_bits), out);
    }

    fn discover(&mut self, block: Block) -> usize {
        let (slot, is_new) = self.blocks.insert(block);
        if is_new {
            log::trace!("live blocks: discovered {} in slot {}", block, slot);
            let new_len = self.states.len() + self.num_bits * 2;
            self.states.resize(new_len, false);
        }
        slot
    }

    /// Raise `block`'s state for `bit` to at least `is_live`.
    pub fn mark_block_live(&mut self, block: Block, bit: usize, is_live: IsLive) {
        assert!(is_live != IsLive::Dead, "blocks are never marked dead");
        let slot = self.discover(block);
        let index = self.state_index(slot, bit);
        let old = IsLive::from_bits(self.states[index], self.states[index + 1]);
        if is_live <= old {
            return;
        }
        self.states.set(index, true);
        self.states.set(index + 1, is_live == IsLive::LiveOut);
    }

    /// A definition block starts out `LiveWithin` so that backward
    /// propagation from uses stops there.
    pub fn initialize_def_block(&mut self, block: Block, range: LeafRange) {
        for bit in range.iter() {
            self.mark_block_live(block, bit, IsLive::LiveWithin);
        }
    }

    /// Update liveness for a use of `range` in `block`. Bits set in
    /// `use_before_def` are used above their local definition, so they
    /// are propagated into predecessors even if the block is already
    /// live. The resulting states of `block` are written to `out`.
    pub fn update_for_use(
        &mut self,
        body: &FunctionBody,
        block: Block,
        range: LeafRange,
        use_before_def: &LeafBits,
        out: &mut LivenessVec,
    ) {
        assert!(self.is_initialized());
        out.clear();
        for bit in range.iter() {
            let ubd = use_before_def.test(bit);
            out.push(self.update_bit_for_use(body, block, bit, ubd));
        }
    }

    pub fn update_bit_for_use(
        &mut self,
        body: &FunctionBody,
        block: Block,
        bit: usize,
        is_use_before_def: bool,
    ) -> IsLive {
        match self.get(block, bit) {
            IsLive::LiveOut | IsLive::LiveWithin if !is_use_before_def => {}
            _ => self.compute_scalar_use_block_liveness(body, block, bit),
        }
        self.get(block, bit)
    }

    fn compute_scalar_use_block_liveness(
        &mut self,
        body: &FunctionBody,
        user_block: Block,
        bit: usize,
    ) {
        // If we are visiting this block, it is not already LiveOut, so
        // the liveness boundary is within the block.
        self.mark_block_live(user_block, bit, IsLive::LiveWithin);

        let mut workqueue = VecDeque::new();
        let mut visited = FxHashSet::default();
        workqueue.push_back(user_block);
        visited.insert(user_block);

        while let Some(block) = workqueue.pop_front() {
            // `block` is live on entry, so every predecessor is live out.
            // Traversal stops at any block that was already live,
            // including definition blocks.
            for &pred in &body.blocks[block].preds {
                match self.get(pred, bit) {
                    IsLive::Dead => {
                        log::trace!("bit {}: {} marks pred {} live-out", bit, block, pred);
                        if visited.insert(pred) {
                            workqueue.push_back(pred);
                        }
                        self.mark_block_live(pred, bit, IsLive::LiveOut);
                    }
                    IsLive::LiveWithin => {
                        self.mark_block_live(pred, bit, IsLive::LiveOut);
                    }
                    IsLive::LiveOut => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::{BlockTarget, Terminator};

    fn br(block: Block) -> Terminator {
        Terminator::Br {
            target: BlockTarget {
                block,
                args: vec![],
            },
        }
    }

    /// entry -> header <-> body, header -> exit
    fn looping_body() -> (FunctionBody, [Block; 4]) {
        let mut body = FunctionBody::new();
        let entry = body.entry;
        let header = body.add_block();
        let latch = body.add_block();
        let exit = body.add_block();
        let mut module = crate::ir::Module::empty();
        let int = module.scalar("Int");
        let cond = body.add_blockparam(entry, int);
        body.set_terminator(entry, br(header));
        body.set_terminator(
            header,
            Terminator::CondBr {
                cond,
                if_true: BlockTarget {
                    block: latch,
                    args: vec![],
                },
                if_false: BlockTarget {
                    block: exit,
                    args: vec![],
                },
            },
        );
        body.set_terminator(latch, br(header));
        body.set_terminator(exit, Terminator::Return { values: vec![] });
        (body, [entry, header, latch, exit])
    }

    #[test]
    fn propagation_through_loop_terminates() {
        let _ = env_logger::try_init();
        let (body, [entry, header, latch, exit]) = looping_body();
        let mut live = LiveBlocks::new(2);
        live.initialize_def_block(entry, LeafRange::new(0, 2));

        let no_ubd = LeafBits::new(2);
        let mut out = LivenessVec::new();
        live.update_for_use(&body, latch, LeafRange::single(0), &no_ubd, &mut out);
        assert_eq!(&out[..], &[IsLive::LiveOut]);

        assert_eq!(live.get(entry, 0), IsLive::LiveOut);
        assert_eq!(live.get(header, 0), IsLive::LiveOut);
        assert_eq!(live.get(latch, 0), IsLive::LiveOut);
        assert_eq!(live.get(exit, 0), IsLive::Dead);
        assert_eq!(live.get(entry, 1), IsLive::LiveWithin);
        assert_eq!(live.get(header, 1), IsLive::Dead);

        assert_eq!(live.discovered_blocks(), &[entry, latch, header]);
    }

    #[test]
    fn states_never_regress() {
        let (body, [entry, header, _, exit]) = looping_body();
        let mut live = LiveBlocks::new(1);
        live.initialize_def_block(entry, LeafRange::single(0));
        let no_ubd = LeafBits::new(1);
        let mut out = LivenessVec::new();

        live.update_for_use(&body, exit, LeafRange::single(0), &no_ubd, &mut out);
        assert_eq!(live.get(exit, 0), IsLive::LiveWithin);
        assert_eq!(live.get(header, 0), IsLive::LiveOut);

        // A use-before-def re-propagates but never lowers the state.
        let mut ubd = LeafBits::new(1);
        ubd.set(0);
        live.update_for_use(&body, header, LeafRange::single(0), &ubd, &mut out);
        assert_eq!(&out[..], &[IsLive::LiveOut]);
        live.mark_block_live(header, 0, IsLive::LiveWithin);
        assert_eq!(live.get(header, 0), IsLive::LiveOut);
    }

    #[test]
    fn reset_forgets_blocks() {
        let (body, [entry, _, latch, _]) = looping_body();
        let mut live = LiveBlocks::new(1);
        live.initialize_def_block(entry, LeafRange::single(0));
        let mut out = LivenessVec::new();
        let no_ubd = LeafBits::new(1);
        live.update_for_use(&body, latch, LeafRange::single(0), &no_ubd, &mut out);
        assert!(!live.discovered_blocks().is_empty());

        live.reset(3);
        assert_eq!(live.num_bits(), 3);
        assert!(live.discovered_blocks().is_empty());
        assert_eq!(live.get(entry, 2), IsLive::Dead);
    }
}
