//! The liveness boundary: where each leaf's live range ends.

use super::blocks::IsLive;
use super::tracker::FieldLiveness;
use crate::ir::{Block, FunctionBody, Value};
use crate::leaf::LeafBits;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Result of a boundary computation. All maps are keyed in entity
/// order, so iteration (and the `Display` dump) is deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Boundary {
    num_bits: usize,
    /// Instructions after which a leaf is dead.
    pub last_users: BTreeMap<Value, LeafBits>,
    /// Definitions (instructions or block parameters) of leaves that
    /// are never live afterwards.
    pub dead_defs: BTreeMap<Value, LeafBits>,
    /// Blocks whose entry kills leaves that are live out of every
    /// predecessor.
    pub boundary_edges: BTreeMap<Block, LeafBits>,
    /// Individual `(pred, succ)` edges that kill leaves live out of
    /// `pred`, when only some of `succ`'s predecessors are live out.
    pub split_edges: BTreeMap<(Block, Block), LeafBits>,
}

impl Boundary {
    pub fn new(num_bits: usize) -> Boundary {
        Boundary {
            num_bits,
            ..Boundary::default()
        }
    }

    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    pub fn clear(&mut self, num_bits: usize) {
        self.num_bits = num_bits;
        self.last_users.clear();
        self.dead_defs.clear();
        self.boundary_edges.clear();
        self.split_edges.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.last_users.is_empty()
            && self.dead_defs.is_empty()
            && self.boundary_edges.is_empty()
            && self.split_edges.is_empty()
    }

    pub fn last_user_bits_mut(&mut self, user: Value) -> &mut LeafBits {
        let num_bits = self.num_bits;
        self.last_users
            .entry(user)
            .or_insert_with(|| LeafBits::new(num_bits))
    }

    pub fn dead_def_bits_mut(&mut self, def: Value) -> &mut LeafBits {
        let num_bits = self.num_bits;
        self.dead_defs
            .entry(def)
            .or_insert_with(|| LeafBits::new(num_bits))
    }

    pub fn boundary_edge_bits_mut(&mut self, block: Block) -> &mut LeafBits {
        let num_bits = self.num_bits;
        self.boundary_edges
            .entry(block)
            .or_insert_with(|| LeafBits::new(num_bits))
    }

    pub fn split_edge_bits_mut(&mut self, pred: Block, succ: Block) -> &mut LeafBits {
        let num_bits = self.num_bits;
        self.split_edges
            .entry((pred, succ))
            .or_insert_with(|| LeafBits::new(num_bits))
    }

    pub fn last_user_bits(&self, user: Value) -> Option<&LeafBits> {
        self.last_users.get(&user)
    }

    pub fn dead_def_bits(&self, def: Value) -> Option<&LeafBits> {
        self.dead_defs.get(&def)
    }

    pub fn boundary_edge_bits(&self, block: Block) -> Option<&LeafBits> {
        self.boundary_edges.get(&block)
    }

    pub fn split_edge_bits(&self, pred: Block, succ: Block) -> Option<&LeafBits> {
        self.split_edges.get(&(pred, succ))
    }

    pub fn is_last_user(&self, user: Value, bit: usize) -> bool {
        self.last_user_bits(user)
            .map_or(false, |bits| bits.test(bit))
    }

    pub fn is_dead_def(&self, def: Value, bit: usize) -> bool {
        self.dead_def_bits(def).map_or(false, |bits| bits.test(bit))
    }

    pub fn is_boundary_edge(&self, block: Block, bit: usize) -> bool {
        self.boundary_edge_bits(block)
            .map_or(false, |bits| bits.test(bit))
    }

    /// Number of last users plus dead defs that end `bit`.
    pub fn num_last_users_and_dead_defs(&self, bit: usize) -> usize {
        self.last_users
            .values()
            .chain(self.dead_defs.values())
            .filter(|bits| bits.test(bit))
            .count()
    }
}

impl Display for Boundary {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        for (user, bits) in &self.last_users {
            writeln!(f, "last user: {}\tat {}", user, bits)?;
        }
        for (block, bits) in &self.boundary_edges {
            writeln!(f, "boundary edge: {}\n\tat {}", block, bits)?;
        }
        for ((pred, succ), bits) in &self.split_edges {
            writeln!(f, "split edge: {} -> {}\n\tat {}", pred, succ, bits)?;
        }
        for (def, bits) in &self.dead_defs {
            writeln!(f, "dead def: {}\tat {}", def, bits)?;
        }
        Ok(())
    }
}

/// In a `LiveWithin` block with no definition of `bit`, the last
/// interesting user is the boundary.
pub(crate) fn find_boundary_in_non_def_block(
    body: &FunctionBody,
    block: Block,
    bit: usize,
    boundary: &mut Boundary,
    liveness: &FieldLiveness,
) {
    assert_eq!(liveness.block_liveness(block, bit), IsLive::LiveWithin);
    log::trace!("boundary: searching non-def {} for bit {}", block, bit);
    for &inst in body.blocks[block].insts.iter().rev() {
        if liveness.is_interesting_user(inst, bit) {
            log::trace!("boundary: last user {} for bit {}", inst, bit);
            boundary.last_user_bits_mut(inst).set(bit);
            return;
        }
    }
    panic!(
        "internal error: {} is live within for bit {} but has no user",
        block, bit
    );
}

/// In a `LiveWithin` block holding the single definition `def` of
/// `bit`, find either the last user or a dead def. No use can precede
/// a dominating definition in its own block.
pub(crate) fn find_boundary_in_ssa_def_block(
    body: &FunctionBody,
    def: Value,
    bit: usize,
    boundary: &mut Boundary,
    liveness: &FieldLiveness,
) {
    let block = body.value_blocks[def];
    log::trace!(
        "boundary: searching def {} in {} for bit {}",
        def,
        block,
        bit
    );
    for &inst in body.blocks[block].insts.iter().rev() {
        if inst == def {
            log::trace!("boundary: dead def {} for bit {}", def, bit);
            boundary.dead_def_bits_mut(inst).set(bit);
            return;
        }
        if liveness.is_interesting_user(inst, bit) {
            log::trace!("boundary: last user {} for bit {}", inst, bit);
            boundary.last_user_bits_mut(inst).set(bit);
            return;
        }
    }

    assert!(
        body.is_blockparam(def),
        "internal error: def {} not found in its block {}",
        def,
        block
    );
    log::trace!("boundary: dead block param {} for bit {}", def, bit);
    boundary.dead_def_bits_mut(def).set(bit);
}
