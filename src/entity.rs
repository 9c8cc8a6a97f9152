//! Typed indices for IR entities, and the tables keyed by them.

use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// A `u32` newtype naming one entity (block, value, type). `u32::MAX`
/// is reserved as the invalid index.
pub trait EntityRef: Clone + Copy + PartialEq + Eq + PartialOrd + Ord + Hash + Debug {
    fn new(index: usize) -> Self;
    fn index(self) -> usize;
    fn invalid() -> Self;

    fn is_valid(self) -> bool {
        self != Self::invalid()
    }
    fn is_invalid(self) -> bool {
        self == Self::invalid()
    }
}

/// Declare an entity type `$name`, printed as `$prefix` followed by its
/// index (`block3`, `v12`).
#[macro_export]
macro_rules! declare_entity {
    ($name:ident, $prefix:expr) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u32);

        impl $crate::entity::EntityRef for $name {
            fn new(index: usize) -> Self {
                assert!(index < u32::MAX as usize, "too many entities");
                Self(index as u32)
            }
            fn index(self) -> usize {
                self.0 as usize
            }
            fn invalid() -> Self {
                Self(u32::MAX)
            }
        }

        impl std::default::Default for $name {
            fn default() -> Self {
                <Self as $crate::entity::EntityRef>::invalid()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                if self.0 == u32::MAX {
                    write!(f, "{}?", $prefix)
                } else {
                    write!(f, "{}{}", $prefix, self.0)
                }
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                std::fmt::Display::fmt(self, f)
            }
        }
    };
}

/// Owning storage for entities: `push` hands out the next index.
#[derive(Clone, Debug)]
pub struct EntityVec<Idx: EntityRef, T> {
    items: Vec<T>,
    _idx: PhantomData<Idx>,
}

impl<Idx: EntityRef, T> Default for EntityVec<Idx, T> {
    fn default() -> Self {
        EntityVec {
            items: vec![],
            _idx: PhantomData,
        }
    }
}

impl<Idx: EntityRef, T> EntityVec<Idx, T> {
    pub fn push(&mut self, item: T) -> Idx {
        let idx = Idx::new(self.items.len());
        self.items.push(item);
        idx
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = Idx> {
        (0..self.items.len()).map(Idx::new)
    }

    pub fn entries(&self) -> impl Iterator<Item = (Idx, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| (Idx::new(i), item))
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = (Idx, &mut T)> {
        self.items
            .iter_mut()
            .enumerate()
            .map(|(i, item)| (Idx::new(i), item))
    }
}

impl<Idx: EntityRef, T> Index<Idx> for EntityVec<Idx, T> {
    type Output = T;
    fn index(&self, idx: Idx) -> &T {
        &self.items[idx.index()]
    }
}

impl<Idx: EntityRef, T> IndexMut<Idx> for EntityVec<Idx, T> {
    fn index_mut(&mut self, idx: Idx) -> &mut T {
        &mut self.items[idx.index()]
    }
}

/// A side table keyed by an entity. Reads of unset entries yield the
/// default value; writes grow the table on demand.
#[derive(Clone, Debug)]
pub struct PerEntity<Idx: EntityRef, T: Clone + Default> {
    items: Vec<T>,
    default: T,
    _idx: PhantomData<Idx>,
}

impl<Idx: EntityRef, T: Clone + Default> Default for PerEntity<Idx, T> {
    fn default() -> Self {
        PerEntity {
            items: Vec::default(),
            default: T::default(),
            _idx: PhantomData,
        }
    }
}

impl<Idx: EntityRef, T: Clone + Default> Index<Idx> for PerEntity<Idx, T> {
    type Output = T;
    fn index(&self, idx: Idx) -> &T {
        self.items.get(idx.index()).unwrap_or(&self.default)
    }
}

impl<Idx: EntityRef, T: Clone + Default> IndexMut<Idx> for PerEntity<Idx, T> {
    fn index_mut(&mut self, idx: Idx) -> &mut T {
        if idx.index() >= self.items.len() {
            self.items.resize(idx.index() + 1, T::default());
        }
        &mut self.items[idx.index()]
    }
}

/// Dense numbering of entities in the order they were first inserted.
///
/// Lets sparse per-entity state live in a packed array indexed by slot,
/// with only the entities actually seen paying for storage.
#[derive(Clone, Debug)]
pub struct Slots<Idx: EntityRef> {
    slot_of: PerEntity<Idx, Option<u32>>,
    order: Vec<Idx>,
}

impl<Idx: EntityRef> Default for Slots<Idx> {
    fn default() -> Self {
        Slots {
            slot_of: PerEntity::default(),
            order: vec![],
        }
    }
}

impl<Idx: EntityRef> Slots<Idx> {
    pub fn get(&self, idx: Idx) -> Option<usize> {
        self.slot_of[idx].map(|slot| slot as usize)
    }

    pub fn contains(&self, idx: Idx) -> bool {
        self.slot_of[idx].is_some()
    }

    /// The slot of `idx`, assigning the next one if it is new. The flag
    /// is true when `idx` was inserted by this call.
    pub fn insert(&mut self, idx: Idx) -> (usize, bool) {
        if let Some(slot) = self.get(idx) {
            return (slot, false);
        }
        let slot = self.order.len();
        self.slot_of[idx] = Some(slot as u32);
        self.order.push(idx);
        (slot, true)
    }

    /// Entities in slot order.
    pub fn order(&self) -> &[Idx] {
        &self.order[..]
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.slot_of = PerEntity::default();
        self.order.clear();
    }
}

impl<Idx: EntityRef> std::iter::FromIterator<Idx> for Slots<Idx> {
    fn from_iter<I: IntoIterator<Item = Idx>>(iter: I) -> Self {
        let mut slots = Slots::default();
        for idx in iter {
            slots.insert(idx);
        }
        slots
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::Block;

    #[test]
    fn slots_follow_first_insertion() {
        let b = |i| Block::new(i);
        let mut slots: Slots<Block> = Slots::default();
        assert_eq!(slots.insert(b(7)), (0, true));
        assert_eq!(slots.insert(b(2)), (1, true));
        assert_eq!(slots.insert(b(7)), (0, false));
        assert_eq!(slots.get(b(2)), Some(1));
        assert_eq!(slots.get(b(3)), None);
        assert_eq!(slots.order(), &[b(7), b(2)]);

        slots.clear();
        assert!(slots.is_empty());
        assert!(!slots.contains(b(7)));

        let collected: Slots<Block> = vec![b(1), b(0), b(1)].into_iter().collect();
        assert_eq!(collected.len(), 2);
        assert_eq!(collected.order(), &[b(1), b(0)]);
    }

    #[test]
    fn per_entity_reads_default_and_grows() {
        let mut table: PerEntity<Block, u32> = PerEntity::default();
        assert_eq!(table[Block::new(5)], 0);
        table[Block::new(5)] = 3;
        assert_eq!(table[Block::new(5)], 3);
        assert_eq!(table[Block::new(4)], 0);
        assert_eq!(
            format!("{} {:?}", Block::new(5), Block::invalid()),
            "block5 block?"
        );
    }
}
