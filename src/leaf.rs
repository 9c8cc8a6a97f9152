//! Leaf model: flattening (possibly nested) aggregate types into a
//! contiguous space of independently tracked leaf bits.
//!
//! Layout rules:
//!
//! - Tuples and structs with fully referenceable storage are the
//!   concatenation of their fields, in declaration order. A struct
//!   with a user-defined deinit gets one extra trailing bit that
//!   tracks the lifetime of the whole object.
//! - Enums are laid out as
//!
//!   ```plain
//!                    ---------|Enum| ---
//!                   /                   \
//!                  v                     v
//!   |Bits for Max Sized Payload|    |Discrim Bit|
//!   ```
//!
//!   so every case's payload starts at offset 0 of the enum's range,
//!   whichever case is active.
//! - Everything else (scalars, opaque storage) is a single bit.

use crate::errors::AnalysisError;
use crate::ir::{FunctionBody, Module, Operator, Type, TypeData, Value, ValueDef};
use crate::options::LivenessOptions;
use bitvec::vec::BitVec;
use smallvec::SmallVec;
use std::ops::Range;

/// Number of leaf bits needed to track `ty`. Always at least one.
pub fn leaf_count(module: &Module, ty: Type) -> usize {
    match module.type_data(ty) {
        TypeData::Tuple { elements } => {
            let count: usize = elements.iter().map(|&elt| leaf_count(module, elt)).sum();
            std::cmp::max(count, 1)
        }
        TypeData::Struct {
            fields,
            has_deinit,
            opaque: false,
            ..
        } => {
            let mut count: usize = fields
                .iter()
                .map(|&(_, field)| leaf_count(module, field))
                .sum();
            if *has_deinit {
                // The object itself has its own liveness.
                count += 1;
            }
            std::cmp::max(count, 1)
        }
        TypeData::Enum { cases, .. } => {
            let max_payload = cases
                .iter()
                .filter_map(|&(_, payload)| payload)
                .map(|payload| leaf_count(module, payload))
                .max()
                .unwrap_or(0);
            max_payload + 1
        }
        TypeData::Struct { opaque: true, .. } | TypeData::Scalar { .. } => 1,
    }
}

/// A dense set of leaf bits for one root value.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct LeafBits(BitVec);

impl LeafBits {
    pub fn new(num_bits: usize) -> LeafBits {
        LeafBits(BitVec::repeat(false, num_bits))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn test(&self, bit: usize) -> bool {
        self.0[bit]
    }

    pub fn set(&mut self, bit: usize) {
        self.0.set(bit, true);
    }

    pub fn reset(&mut self, bit: usize) {
        self.0.set(bit, false);
    }

    pub fn set_range(&mut self, range: LeafRange) {
        self.0[range.start..range.end].fill(true);
    }

    pub fn clear(&mut self) {
        self.0.fill(false);
    }

    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter_ones()
    }

    pub fn any_in(&self, range: LeafRange) -> bool {
        self.0[range.start..range.end].any()
    }

    pub fn all_in(&self, range: LeafRange) -> bool {
        self.0[range.start..range.end].all()
    }
}

impl std::fmt::Display for LeafBits {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for bit in self.0.iter().by_vals() {
            write!(f, "{}", if bit { '1' } else { '0' })?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for LeafBits {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "LeafBits({})", self)
    }
}

/// A contiguous half-open span `[start, end)` of leaf bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LeafRange {
    pub start: usize,
    pub end: usize,
}

impl LeafRange {
    pub fn new(start: usize, end: usize) -> LeafRange {
        assert!(start <= end, "leaf range [{}, {}) is inverted", start, end);
        LeafRange { start, end }
    }

    pub fn single(bit: usize) -> LeafRange {
        LeafRange::new(bit, bit + 1)
    }

    /// The range covering every leaf of `ty`.
    pub fn for_type(module: &Module, ty: Type) -> LeafRange {
        LeafRange::new(0, leaf_count(module, ty))
    }

    /// The range of leaves of the address `root` that `derived` (an
    /// address projection chain ending at `root`) denotes.
    pub fn for_address(
        module: &Module,
        body: &FunctionBody,
        derived: Value,
        root: Value,
        options: &LivenessOptions,
    ) -> Result<Option<LeafRange>, AnalysisError> {
        let offset = SubElementOffset::compute_for_address(module, body, derived, root, options)?;
        offset
            .map(|offset| Self::from_offset(module, body, derived, offset, options))
            .transpose()
            .map(Option::flatten)
    }

    /// The range of leaves of the value `root` that `derived` (a value
    /// projection chain ending at `root`) denotes.
    pub fn for_value(
        module: &Module,
        body: &FunctionBody,
        derived: Value,
        root: Value,
        options: &LivenessOptions,
    ) -> Result<Option<LeafRange>, AnalysisError> {
        let offset = SubElementOffset::compute_for_value(module, body, derived, root, options)?;
        offset
            .map(|offset| Self::from_offset(module, body, derived, offset, options))
            .transpose()
            .map(Option::flatten)
    }

    fn from_offset(
        module: &Module,
        body: &FunctionBody,
        derived: Value,
        offset: SubElementOffset,
        options: &LivenessOptions,
    ) -> Result<Option<LeafRange>, AnalysisError> {
        match body.value_type(derived) {
            Some(ty) => {
                let end = offset.0 + leaf_count(module, ty);
                Ok(Some(LeafRange::new(offset.0, end)))
            }
            None if options.strict_projections => Err(AnalysisError::UntypedValue(derived)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, bit: usize) -> bool {
        self.start <= bit && bit < self.end
    }

    pub fn size(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn iter(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn is_entire_type(&self, module: &Module, ty: Type) -> bool {
        self.start == 0 && self.end == leaf_count(module, ty)
    }

    pub fn set_bits(&self, bits: &mut LeafBits) {
        bits.set_range(*self);
    }

    /// Call `f` once for every maximal run of set bits in `bits`.
    pub fn visit_contiguous_ranges<F: FnMut(LeafRange)>(bits: &LeafBits, mut f: F) {
        let mut current = None;
        for bit in 0..bits.len() {
            let is_set = bits.test(bit);
            match current {
                Some(start) if !is_set => {
                    f(LeafRange::new(start, bit));
                    current = None;
                }
                None if is_set => current = Some(bit),
                _ => {}
            }
        }
        if let Some(start) = current {
            f(LeafRange::new(start, bits.len()));
        }
    }
}

impl std::fmt::Display for LeafRange {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Offset of a projection's first leaf within its root.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubElementOffset(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ChainKind {
    Address,
    Value,
}

impl SubElementOffset {
    pub fn compute_for_address(
        module: &Module,
        body: &FunctionBody,
        derived: Value,
        root: Value,
        options: &LivenessOptions,
    ) -> Result<Option<SubElementOffset>, AnalysisError> {
        Self::compute(module, body, derived, root, options, ChainKind::Address)
    }

    pub fn compute_for_value(
        module: &Module,
        body: &FunctionBody,
        derived: Value,
        root: Value,
        options: &LivenessOptions,
    ) -> Result<Option<SubElementOffset>, AnalysisError> {
        Self::compute(module, body, derived, root, options, ChainKind::Value)
    }

    fn compute(
        module: &Module,
        body: &FunctionBody,
        derived: Value,
        root: Value,
        options: &LivenessOptions,
        kind: ChainKind,
    ) -> Result<Option<SubElementOffset>, AnalysisError> {
        let unknown = |at: Value| -> Result<Option<SubElementOffset>, AnalysisError> {
            log::trace!(
                "projection offset: cannot look through {} on the way from {} to {}",
                at,
                derived,
                root
            );
            if options.strict_projections {
                Err(AnalysisError::UnsupportedProjection { derived, at })
            } else {
                Ok(None)
            }
        };

        let mut offset = 0;
        let mut current = derived;
        // A well-formed chain visits each value at most once.
        for _ in 0..=body.values.len() {
            if current == root {
                log::trace!(
                    "projection offset: {} is {} leaves into {}",
                    derived,
                    offset,
                    root
                );
                return Ok(Some(SubElementOffset(offset)));
            }

            let (operand, skipped) = match (&body.values[current], kind) {
                (ValueDef::Operator(op, args, _), ChainKind::Address) => match op {
                    Operator::ProjectBox
                    | Operator::BeginAccess
                    | Operator::UnwrapAddr
                    | Operator::TakeEnumDataAddr { .. }
                    | Operator::InitEnumDataAddr { .. } => (args[0], 0),
                    Operator::StoreBorrow => (args[1], 0),
                    &Operator::TupleElementAddr { index } => {
                        match preceding_elements(module, body, args[0], index) {
                            Some(skipped) => (args[0], skipped),
                            None => return unknown(current),
                        }
                    }
                    &Operator::StructElementAddr { field } => {
                        match preceding_fields(module, body, args[0], field) {
                            Some(skipped) => (args[0], skipped),
                            None => return unknown(current),
                        }
                    }
                    _ => return unknown(current),
                },
                (ValueDef::Operator(op, args, _), ChainKind::Value) => match op {
                    Operator::BeginBorrow
                    | Operator::CopyValue
                    | Operator::UnwrapValue
                    | Operator::UncheckedEnumData { .. } => (args[0], 0),
                    &Operator::TupleExtract { index } => {
                        match preceding_elements(module, body, args[0], index) {
                            Some(skipped) => (args[0], skipped),
                            None => return unknown(current),
                        }
                    }
                    &Operator::StructExtract { field } => {
                        match preceding_fields(module, body, args[0], field) {
                            Some(skipped) => (args[0], skipped),
                            None => return unknown(current),
                        }
                    }
                    _ => return unknown(current),
                },
                (&ValueDef::PickOutput(inst, index, _), ChainKind::Value) => {
                    match &body.values[inst] {
                        ValueDef::Operator(Operator::DestructureStruct, args, _) => {
                            match preceding_fields(module, body, args[0], index) {
                                Some(skipped) => (args[0], skipped),
                                None => return unknown(current),
                            }
                        }
                        ValueDef::Operator(Operator::DestructureTuple, args, _) => {
                            match preceding_elements(module, body, args[0], index) {
                                Some(skipped) => (args[0], skipped),
                                None => return unknown(current),
                            }
                        }
                        _ => return unknown(current),
                    }
                }
                _ => return unknown(current),
            };

            offset += skipped;
            current = operand;
        }

        unknown(current)
    }
}

/// Leaves occupied by the fields declared before `field` in the struct
/// type of `aggregate`.
fn preceding_fields(
    module: &Module,
    body: &FunctionBody,
    aggregate: Value,
    field: usize,
) -> Option<usize> {
    let fields = module.referenceable_fields(body.value_type(aggregate)?)?;
    if field >= fields.len() {
        return None;
    }
    Some(
        fields[..field]
            .iter()
            .map(|&(_, ty)| leaf_count(module, ty))
            .sum(),
    )
}

/// Leaves occupied by the elements before `index` in the tuple type of
/// `aggregate`.
fn preceding_elements(
    module: &Module,
    body: &FunctionBody,
    aggregate: Value,
    index: usize,
) -> Option<usize> {
    match module.type_data(body.value_type(aggregate)?) {
        TypeData::Tuple { elements } if index < elements.len() => Some(
            elements[..index]
                .iter()
                .map(|&ty| leaf_count(module, ty))
                .sum(),
        ),
        _ => None,
    }
}

/// One step of a projection path from a root value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProjectionStep {
    Field(usize),
    Element(usize),
}

pub type ProjectionPath = SmallVec<[ProjectionStep; 4]>;

/// Plan the smallest set of field/element projections of a `root_ty`
/// value whose leaf ranges together cover exactly the set bits of
/// `needed`. Results are ordered by range start.
///
/// Enums are never split: asking for part of an enum is a caller bug.
pub fn needed_projections(
    module: &Module,
    root_ty: Type,
    needed: &LeafBits,
) -> Vec<(ProjectionPath, LeafRange)> {
    let root_range = LeafRange::for_type(module, root_ty);
    assert_eq!(root_range.size(), needed.len());

    let mut results = vec![];
    let mut worklist: Vec<(ProjectionPath, Type, LeafRange)> =
        vec![(ProjectionPath::new(), root_ty, root_range)];

    while let Some((path, ty, range)) = worklist.pop() {
        if !needed.any_in(range) {
            continue;
        }
        if needed.all_in(range) {
            log::trace!("needed_projections: {:?} covers {}", path, range);
            results.push((path, range));
            continue;
        }

        // Partially needed: split into children that have any needed bits.
        let children: Vec<(ProjectionStep, Type)> = match module.type_data(ty) {
            TypeData::Struct {
                name,
                fields,
                has_deinit,
                opaque: false,
            } => {
                // The deinit bit has no projection of its own.
                if *has_deinit && needed.test(range.end - 1) {
                    panic!(
                        "internal error: {} has a deinit and may only be projected as a whole",
                        name
                    );
                }
                fields
                    .iter()
                    .enumerate()
                    .map(|(i, &(_, field))| (ProjectionStep::Field(i), field))
                    .collect()
            }
            TypeData::Tuple { elements } => elements
                .iter()
                .enumerate()
                .map(|(i, &elt)| (ProjectionStep::Element(i), elt))
                .collect(),
            TypeData::Enum { name, .. } => {
                panic!(
                    "internal error: enum {} in {} may only be projected as a whole",
                    name, range
                );
            }
            TypeData::Scalar { .. } | TypeData::Struct { opaque: true, .. } => {
                unreachable!("single-leaf type cannot be partially needed")
            }
        };

        let mut start = range.start;
        for (step, child_ty) in children {
            let next = start + leaf_count(module, child_ty);
            let child_range = LeafRange::new(start, next);
            if needed.any_in(child_range) {
                let mut child_path = path.clone();
                child_path.push(step);
                worklist.push((child_path, child_ty, child_range));
            }
            start = next;
        }
    }

    results.sort_by_key(|&(_, range)| range);
    results
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::Operator;

    fn pair_module() -> (Module, Type, Type, Type) {
        let mut module = Module::empty();
        let int = module.scalar("Int");
        let pair = module.structure("Pair", vec![("a", int), ("b", int)], false);
        let outer = module.structure("Outer", vec![("x", int), ("p", pair)], true);
        (module, int, pair, outer)
    }

    #[test]
    fn leaf_counts() {
        let _ = env_logger::try_init();
        let (mut module, int, pair, outer) = pair_module();
        assert_eq!(leaf_count(&module, int), 1);
        assert_eq!(leaf_count(&module, pair), 2);
        // 1 + 2 + deinit bit.
        assert_eq!(leaf_count(&module, outer), 4);

        let tuple = module.tuple(vec![int, pair, outer]);
        assert_eq!(leaf_count(&module, tuple), 1 + 2 + 4);

        let empty = module.structure("Empty", vec![], false);
        assert_eq!(leaf_count(&module, empty), 1);
        let empty_tuple = module.tuple(vec![]);
        assert_eq!(leaf_count(&module, empty_tuple), 1);
        let opaque = module.opaque_structure("Resilient");
        assert_eq!(leaf_count(&module, opaque), 1);
        let empty_with_deinit = module.structure("Handle", vec![], true);
        assert_eq!(leaf_count(&module, empty_with_deinit), 1);
    }

    #[test]
    fn enum_layout() {
        let (mut module, int, _pair, _) = pair_module();
        let triple = module.tuple(vec![int, int, int]);
        let e = module.enumeration(
            "E",
            vec![
                ("none", None),
                ("one", Some(int)),
                ("three", Some(triple)),
            ],
        );
        assert_eq!(leaf_count(&module, e), 4);
        let no_payload = module.enumeration("Flag", vec![("on", None), ("off", None)]);
        assert_eq!(leaf_count(&module, no_payload), 1);

        let mut body = FunctionBody::new();
        let entry = body.entry;
        let root = body.add_blockparam(entry, e);
        let one = body.add_inst(
            entry,
            Operator::UncheckedEnumData { case: 1 },
            vec![root],
            vec![int],
        );
        let three = body.add_inst(
            entry,
            Operator::UncheckedEnumData { case: 2 },
            vec![root],
            vec![triple],
        );
        let opts = LivenessOptions::default();
        assert_eq!(
            LeafRange::for_value(&module, &body, one, root, &opts),
            Ok(Some(LeafRange::new(0, 1)))
        );
        assert_eq!(
            LeafRange::for_value(&module, &body, three, root, &opts),
            Ok(Some(LeafRange::new(0, 3)))
        );
    }

    #[test]
    fn value_projection_offsets() {
        let _ = env_logger::try_init();
        let (module, int, pair, outer) = pair_module();
        let mut body = FunctionBody::new();
        let entry = body.entry;
        let root = body.add_blockparam(entry, outer);
        let borrow = body.add_inst(entry, Operator::BeginBorrow, vec![root], vec![outer]);
        let p = body.add_inst(
            entry,
            Operator::StructExtract { field: 1 },
            vec![borrow],
            vec![pair],
        );
        let b = body.add_inst(
            entry,
            Operator::StructExtract { field: 1 },
            vec![p],
            vec![int],
        );
        let parts = body.add_inst(entry, Operator::DestructureStruct, vec![p], vec![]);
        let a = body.add_pick_output(parts, 0, int);
        let b2 = body.add_pick_output(parts, 1, int);

        let opts = LivenessOptions::default();
        let range = |v| LeafRange::for_value(&module, &body, v, root, &opts).unwrap();
        assert_eq!(range(root), Some(LeafRange::new(0, 4)));
        assert_eq!(range(p), Some(LeafRange::new(1, 3)));
        assert_eq!(range(b), Some(LeafRange::new(2, 3)));
        assert_eq!(range(a), Some(LeafRange::new(1, 2)));
        assert_eq!(range(b2), Some(LeafRange::new(2, 3)));
    }

    #[test]
    fn address_projection_offsets() {
        let (mut module, int, pair, _) = pair_module();
        let tuple = module.tuple(vec![int, pair]);
        let mut body = FunctionBody::new();
        let entry = body.entry;
        let root = body.add_inst(entry, Operator::AllocStack, vec![], vec![tuple]);
        let access = body.add_inst(entry, Operator::BeginAccess, vec![root], vec![tuple]);
        let elt = body.add_inst(
            entry,
            Operator::TupleElementAddr { index: 1 },
            vec![access],
            vec![pair],
        );
        let field = body.add_inst(
            entry,
            Operator::StructElementAddr { field: 1 },
            vec![elt],
            vec![int],
        );

        let opts = LivenessOptions::default();
        assert_eq!(
            SubElementOffset::compute_for_address(&module, &body, field, root, &opts),
            Ok(Some(SubElementOffset(2)))
        );
        assert_eq!(
            LeafRange::for_address(&module, &body, elt, root, &opts),
            Ok(Some(LeafRange::new(1, 3)))
        );
    }

    #[test]
    fn unknown_projection_policy() {
        let (module, int, pair, _) = pair_module();
        let mut body = FunctionBody::new();
        let entry = body.entry;
        let root = body.add_blockparam(entry, pair);
        let loaded = body.add_inst(
            entry,
            Operator::Load { take: false },
            vec![root],
            vec![pair],
        );
        let field = body.add_inst(
            entry,
            Operator::StructExtract { field: 0 },
            vec![loaded],
            vec![int],
        );

        let lenient = LivenessOptions::default();
        assert_eq!(
            LeafRange::for_value(&module, &body, field, root, &lenient),
            Ok(None)
        );

        let strict = LivenessOptions::strict();
        assert_eq!(
            LeafRange::for_value(&module, &body, field, root, &strict),
            Err(AnalysisError::UnsupportedProjection {
                derived: field,
                at: loaded
            })
        );
    }

    #[test]
    fn contiguous_ranges() {
        let mut bits = LeafBits::new(7);
        bits.set(0);
        bits.set_range(LeafRange::new(2, 4));
        bits.set(6);
        let mut ranges = vec![];
        LeafRange::visit_contiguous_ranges(&bits, |range| ranges.push(range));
        assert_eq!(
            ranges,
            vec![
                LeafRange::new(0, 1),
                LeafRange::new(2, 4),
                LeafRange::new(6, 7)
            ]
        );
        assert_eq!(format!("{}", bits), "1011001");
    }

    #[test]
    fn whole_type_ranges() {
        let (module, int, pair, outer) = pair_module();
        assert!(LeafRange::for_type(&module, outer).is_entire_type(&module, outer));
        assert!(LeafRange::new(0, 2).is_entire_type(&module, pair));
        assert!(!LeafRange::new(1, 3).is_entire_type(&module, pair));
        assert!(!LeafRange::new(0, 3).is_entire_type(&module, outer));
        assert!(LeafRange::single(0).is_entire_type(&module, int));

        let mut bits = LeafBits::new(4);
        LeafRange::new(1, 3).set_bits(&mut bits);
        LeafRange::new(2, 2).set_bits(&mut bits);
        assert_eq!(format!("{}", bits), "0110");
        assert!(bits.all_in(LeafRange::new(1, 3)));
        assert!(!bits.any_in(LeafRange::single(3)));
    }

    #[test]
    fn projection_planning() {
        let (module, _int, _pair, outer) = pair_module();
        // Outer = { x: Int, p: { a, b } } + deinit; leaves x=0, a=1, b=2, deinit=3.
        let mut needed = LeafBits::new(4);
        needed.set(0);
        needed.set(2);
        let plan = needed_projections(&module, outer, &needed);
        let expected: Vec<(ProjectionPath, LeafRange)> = vec![
            (
                [ProjectionStep::Field(0)].iter().copied().collect(),
                LeafRange::new(0, 1),
            ),
            (
                [ProjectionStep::Field(1), ProjectionStep::Field(1)]
                    .iter()
                    .copied()
                    .collect(),
                LeafRange::new(2, 3),
            ),
        ];
        assert_eq!(plan, expected);

        let mut all = LeafBits::new(4);
        all.set_range(LeafRange::new(0, 4));
        let plan = needed_projections(&module, outer, &all);
        assert_eq!(plan.len(), 1);
        assert!(plan[0].0.is_empty());
    }

    #[test]
    #[should_panic(expected = "Outer has a deinit and may only be projected as a whole")]
    fn projection_planning_rejects_deinit_bit() {
        let (module, _int, _pair, outer) = pair_module();
        let mut needed = LeafBits::new(4);
        needed.set(0);
        needed.set(3);
        needed_projections(&module, outer, &needed);
    }

    #[test]
    #[should_panic(expected = "enum Maybe in [1, 4) may only be projected as a whole")]
    fn projection_planning_rejects_partial_enum() {
        let (mut module, int, pair, _) = pair_module();
        let maybe = module.enumeration("Maybe", vec![("none", None), ("some", Some(pair))]);
        let tuple = module.tuple(vec![int, maybe]);
        // Leaves: int=0, payload a=1, payload b=2, discriminator=3.
        let mut needed = LeafBits::new(4);
        needed.set(0);
        needed.set(1);
        needed_projections(&module, tuple, &needed);
    }
}
