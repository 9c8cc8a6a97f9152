//! Recording users of a root value's leaves and driving block liveness.

use super::blocks::{IsLive, LiveBlocks, LivenessVec};
use crate::entity::EntityRef;
use crate::ir::{Block, FunctionBody, Value};
use crate::leaf::{LeafBits, LeafRange};
use fxhash::FxHashMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// How an interesting user touches one leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UseKind {
    /// Touches storage without being a semantic use; only extends
    /// liveness.
    NonUse,
    /// Ends the leaf's lifetime.
    LifetimeEnding,
    /// Observes the leaf.
    NonEnding,
}

/// Per-user record. `live` marks bits used, `consuming` marks bits
/// whose use ends the lifetime. A `consuming` bit that is not `live` is
/// a non-use.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserBits {
    pub live: LeafBits,
    pub consuming: LeafBits,
}

impl UserBits {
    fn new(num_bits: usize) -> UserBits {
        UserBits {
            live: LeafBits::new(num_bits),
            consuming: LeafBits::new(num_bits),
        }
    }

    fn add_use(&mut self, bit: usize, lifetime_ending: bool) {
        if !self.live.test(bit) {
            self.live.set(bit);
            if lifetime_ending {
                self.consuming.set(bit);
            } else {
                self.consuming.reset(bit);
            }
        } else if !lifetime_ending {
            // A non-ending use of the same leaf keeps it alive past
            // this instruction.
            self.consuming.reset(bit);
        }
    }

    fn add_non_use(&mut self, bit: usize) {
        if !self.live.test(bit) {
            self.consuming.set(bit);
        }
    }

    pub fn kind(&self, bit: usize) -> Option<UseKind> {
        match (self.live.test(bit), self.consuming.test(bit)) {
            (true, true) => Some(UseKind::LifetimeEnding),
            (true, false) => Some(UseKind::NonEnding),
            (false, true) => Some(UseKind::NonUse),
            (false, false) => None,
        }
    }
}

/// Field-sensitive liveness of one root value: block states plus the
/// users recorded so far. Knows nothing about definitions; see
/// `FieldLiveRange`.
#[derive(Clone, Debug, Default)]
pub struct FieldLiveness {
    live_blocks: LiveBlocks,
    users: FxHashMap<Value, UserBits>,
    user_order: Vec<Value>,
}

impl FieldLiveness {
    pub fn new(num_bits: usize) -> FieldLiveness {
        FieldLiveness {
            live_blocks: LiveBlocks::new(num_bits),
            ..FieldLiveness::default()
        }
    }

    pub fn num_bits(&self) -> usize {
        self.live_blocks.num_bits()
    }

    pub fn is_initialized(&self) -> bool {
        self.live_blocks.is_initialized()
    }

    pub fn reset(&mut self, num_bits: usize) {
        self.live_blocks.reset(num_bits);
        self.users.clear();
        self.user_order.clear();
    }

    pub fn live_blocks(&self) -> &LiveBlocks {
        &self.live_blocks
    }

    pub fn discovered_blocks(&self) -> &[Block] {
        self.live_blocks.discovered_blocks()
    }

    pub fn block_liveness(&self, block: Block, bit: usize) -> IsLive {
        self.live_blocks.get(block, bit)
    }

    pub fn initialize_def_block(&mut self, block: Block, range: LeafRange) {
        self.live_blocks.initialize_def_block(block, range);
    }

    /// Users in the order they were first recorded.
    pub fn users(&self) -> impl Iterator<Item = (Value, &UserBits)> + '_ {
        self.user_order
            .iter()
            .map(move |&user| (user, &self.users[&user]))
    }

    pub fn interesting_user(&self, inst: Value, bit: usize) -> Option<UseKind> {
        self.users.get(&inst).and_then(|bits| bits.kind(bit))
    }

    /// Any recorded user, non-uses included.
    pub fn is_interesting_user(&self, inst: Value, bit: usize) -> bool {
        self.interesting_user(inst, bit).is_some()
    }

    fn user_block(body: &FunctionBody, user: Value) -> Block {
        let block = body.value_blocks[user];
        assert!(
            block.is_valid(),
            "internal error: user {} is not placed in a block",
            user
        );
        block
    }

    fn user_entry(&mut self, user: Value) -> &mut UserBits {
        let num_bits = self.num_bits();
        let user_order = &mut self.user_order;
        self.users.entry(user).or_insert_with(|| {
            user_order.push(user);
            UserBits::new(num_bits)
        })
    }

    fn propagate(
        &mut self,
        body: &FunctionBody,
        user: Value,
        range: LeafRange,
        use_before_def: &LeafBits,
    ) {
        let block = Self::user_block(body, user);
        let mut resulting = LivenessVec::new();
        self.live_blocks
            .update_for_use(body, block, range, use_before_def, &mut resulting);
        log::trace!(
            "update_for_use: {} in {} over {} -> {:?}",
            user,
            block,
            range,
            resulting
        );
    }

    /// Record `user` as a use of `range`.
    pub fn update_for_use(
        &mut self,
        body: &FunctionBody,
        user: Value,
        range: LeafRange,
        lifetime_ending: bool,
        use_before_def: &LeafBits,
    ) {
        self.propagate(body, user, range, use_before_def);
        let entry = self.user_entry(user);
        for bit in range.iter() {
            entry.add_use(bit, lifetime_ending);
        }
    }

    /// Record `user` as a use of every set bit in `bits`.
    pub fn update_for_use_bits(
        &mut self,
        body: &FunctionBody,
        user: Value,
        bits: &LeafBits,
        lifetime_ending: bool,
        use_before_def: &LeafBits,
    ) {
        LeafRange::visit_contiguous_ranges(bits, |range| {
            self.update_for_use(body, user, range, lifetime_ending, use_before_def);
        });
    }

    /// Extend liveness of `range` to `user` without making it a use.
    pub fn extend_to_non_use(
        &mut self,
        body: &FunctionBody,
        user: Value,
        range: LeafRange,
        use_before_def: &LeafBits,
    ) {
        self.propagate(body, user, range, use_before_def);
        let entry = self.user_entry(user);
        for bit in range.iter() {
            entry.add_non_use(bit);
        }
    }

    pub fn extend_to_non_use_bits(
        &mut self,
        body: &FunctionBody,
        user: Value,
        bits: &LeafBits,
        use_before_def: &LeafBits,
    ) {
        LeafRange::visit_contiguous_ranges(bits, |range| {
            self.extend_to_non_use(body, user, range, use_before_def);
        });
    }
}

impl Display for LiveBlocks {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        for &block in self.discovered_blocks() {
            write!(f, "{}: ", block)?;
            for bit in 0..self.num_bits() {
                write!(f, "{}, ", self.get(block, bit))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl Display for FieldLiveness {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.live_blocks)?;
        for (user, bits) in self.users() {
            for bit in 0..self.num_bits() {
                let label = match bits.kind(bit) {
                    None => continue,
                    Some(UseKind::NonUse) => "non-user",
                    Some(UseKind::LifetimeEnding) => "lifetime-ending user",
                    Some(UseKind::NonEnding) => "regular user",
                };
                writeln!(f, "{}: {}\tat {}", label, user, bit)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::{Module, Operator, Terminator};

    fn straight_line(n: usize) -> (FunctionBody, Vec<Value>) {
        let mut module = Module::empty();
        let int = module.scalar("Int");
        let mut body = FunctionBody::new();
        let entry = body.entry;
        let insts = (0..n)
            .map(|i| {
                body.add_inst(
                    entry,
                    Operator::Apply {
                        callee: format!("f{}", i),
                    },
                    vec![],
                    vec![int],
                )
            })
            .collect();
        body.set_terminator(entry, Terminator::Return { values: vec![] });
        (body, insts)
    }

    #[test]
    fn user_merging() {
        use UseKind::{LifetimeEnding, NonEnding, NonUse};
        let _ = env_logger::try_init();
        let (body, insts) = straight_line(3);
        let mut liveness = FieldLiveness::new(3);
        liveness.initialize_def_block(body.entry, LeafRange::new(0, 3));
        let no_ubd = LeafBits::new(3);

        // Ending, then non-ending on bit 0: non-ending wins.
        liveness.update_for_use(&body, insts[1], LeafRange::single(0), true, &no_ubd);
        liveness.update_for_use(&body, insts[1], LeafRange::new(0, 2), false, &no_ubd);
        assert_eq!(liveness.interesting_user(insts[1], 0), Some(NonEnding));
        assert_eq!(liveness.interesting_user(insts[1], 1), Some(NonEnding));

        // Non-ending, then ending stays non-ending.
        liveness.update_for_use(&body, insts[1], LeafRange::single(1), true, &no_ubd);
        assert_eq!(liveness.interesting_user(insts[1], 1), Some(NonEnding));

        // A non-use never downgrades a use.
        liveness.extend_to_non_use(&body, insts[2], LeafRange::new(1, 3), &no_ubd);
        liveness.update_for_use(&body, insts[2], LeafRange::single(2), true, &no_ubd);
        assert_eq!(liveness.interesting_user(insts[2], 1), Some(NonUse));
        assert_eq!(liveness.interesting_user(insts[2], 2), Some(LifetimeEnding));
        liveness.extend_to_non_use(&body, insts[2], LeafRange::single(2), &no_ubd);
        assert_eq!(liveness.interesting_user(insts[2], 2), Some(LifetimeEnding));

        assert_eq!(liveness.interesting_user(insts[0], 0), None);
        assert!(!liveness.is_interesting_user(insts[2], 0));
    }

    #[test]
    fn dump_format() {
        let (body, insts) = straight_line(2);
        let mut liveness = FieldLiveness::new(2);
        liveness.initialize_def_block(body.entry, LeafRange::new(0, 2));
        let no_ubd = LeafBits::new(2);
        liveness.update_for_use(&body, insts[1], LeafRange::single(0), true, &no_ubd);
        liveness.extend_to_non_use(&body, insts[0], LeafRange::single(1), &no_ubd);

        let dump = format!("{}", liveness);
        assert_eq!(
            dump,
            format!(
                "block0: LiveWithin, LiveWithin, \n\
                 lifetime-ending user: {}\tat 0\n\
                 non-user: {}\tat 1\n",
                insts[1], insts[0]
            )
        );
    }

    #[test]
    fn bits_variant_visits_runs() {
        let (body, insts) = straight_line(1);
        let mut liveness = FieldLiveness::new(4);
        liveness.initialize_def_block(body.entry, LeafRange::new(0, 4));
        let mut bits = LeafBits::new(4);
        bits.set(0);
        bits.set(2);
        bits.set(3);
        liveness.update_for_use_bits(&body, insts[0], &bits, false, &LeafBits::new(4));
        assert!(liveness.is_interesting_user(insts[0], 0));
        assert!(!liveness.is_interesting_user(insts[0], 1));
        assert!(liveness.is_interesting_user(insts[0], 3));
        assert_eq!(liveness.users().count(), 1);
    }
}
