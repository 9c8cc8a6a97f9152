//! Structural type store.

use super::Type;
use crate::entity::EntityVec;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeData {
    /// A single indivisible value (integer, reference, class
    /// instance, ...).
    Scalar { name: String },
    /// An anonymous tuple.
    Tuple { elements: Vec<Type> },
    /// A nominal struct. `opaque` structs have storage that cannot be
    /// referenced field-by-field (resilient or foreign layout).
    Struct {
        name: String,
        fields: Vec<(String, Type)>,
        has_deinit: bool,
        opaque: bool,
    },
    /// A discriminated union. Cases without a payload carry `None`.
    Enum {
        name: String,
        cases: Vec<(String, Option<Type>)>,
    },
}

impl TypeData {
    pub fn name(&self) -> &str {
        match self {
            TypeData::Scalar { name }
            | TypeData::Struct { name, .. }
            | TypeData::Enum { name, .. } => &name[..],
            TypeData::Tuple { .. } => "tuple",
        }
    }
}

/// The types a function body refers to.
#[derive(Clone, Debug, Default)]
pub struct Module {
    pub types: EntityVec<Type, TypeData>,
}

impl Module {
    pub fn empty() -> Module {
        Module::default()
    }

    pub fn add_type(&mut self, data: TypeData) -> Type {
        let ty = self.types.push(data);
        log::trace!("add_type: {} = {:?}", ty, self.types[ty]);
        ty
    }

    pub fn scalar(&mut self, name: &str) -> Type {
        self.add_type(TypeData::Scalar {
            name: name.to_owned(),
        })
    }

    pub fn tuple(&mut self, elements: Vec<Type>) -> Type {
        self.add_type(TypeData::Tuple { elements })
    }

    pub fn structure(&mut self, name: &str, fields: Vec<(&str, Type)>, has_deinit: bool) -> Type {
        self.add_type(TypeData::Struct {
            name: name.to_owned(),
            fields: fields
                .into_iter()
                .map(|(field, ty)| (field.to_owned(), ty))
                .collect(),
            has_deinit,
            opaque: false,
        })
    }

    pub fn opaque_structure(&mut self, name: &str) -> Type {
        self.add_type(TypeData::Struct {
            name: name.to_owned(),
            fields: vec![],
            has_deinit: false,
            opaque: true,
        })
    }

    pub fn enumeration(&mut self, name: &str, cases: Vec<(&str, Option<Type>)>) -> Type {
        self.add_type(TypeData::Enum {
            name: name.to_owned(),
            cases: cases
                .into_iter()
                .map(|(case, payload)| (case.to_owned(), payload))
                .collect(),
        })
    }

    pub fn type_data(&self, ty: Type) -> &TypeData {
        &self.types[ty]
    }

    /// The stored fields of `ty` in declaration order, if `ty` is a
    /// struct whose storage is fully referenceable.
    pub fn referenceable_fields(&self, ty: Type) -> Option<&[(String, Type)]> {
        match &self.types[ty] {
            TypeData::Struct {
                fields,
                opaque: false,
                ..
            } => Some(&fields[..]),
            _ => None,
        }
    }
}
