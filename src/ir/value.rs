use super::{Block, Type, Value};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueDef {
    BlockParam(Block, usize, Type),
    /// An instruction: operator, operands, result types. Instructions
    /// with more than one result expose them through `PickOutput`.
    Operator(Operator, Vec<Value>, Vec<Type>),
    PickOutput(Value, usize, Type),
}

impl ValueDef {
    pub fn ty(&self) -> Option<Type> {
        match self {
            &ValueDef::BlockParam(_, _, ty) | &ValueDef::PickOutput(_, _, ty) => Some(ty),
            ValueDef::Operator(_, _, tys) if tys.len() == 1 => Some(tys[0]),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    AllocStack,
    AllocBox,
    Apply { callee: String },
    Load { take: bool },
    /// `store src to dest`; operands are `[src, dest]`.
    Store,
    DestroyValue,
    DestroyAddr,
    EndBorrow,
    EndAccess,
    Struct,
    Tuple,
    Enum { case: usize },

    // Projections of loaded values.
    StructExtract { field: usize },
    TupleExtract { index: usize },
    UncheckedEnumData { case: usize },
    DestructureStruct,
    DestructureTuple,
    BeginBorrow,
    CopyValue,
    UnwrapValue,

    // Projections of addresses.
    StructElementAddr { field: usize },
    TupleElementAddr { index: usize },
    TakeEnumDataAddr { case: usize },
    InitEnumDataAddr { case: usize },
    BeginAccess,
    /// `store_borrow src to dest`; operands are `[src, dest]`, the
    /// result aliases `dest`.
    StoreBorrow,
    ProjectBox,
    UnwrapAddr,
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Operator::AllocStack => write!(f, "alloc_stack"),
            Operator::AllocBox => write!(f, "alloc_box"),
            Operator::Apply { callee } => write!(f, "apply<{}>", callee),
            Operator::Load { take: true } => write!(f, "load [take]"),
            Operator::Load { take: false } => write!(f, "load [copy]"),
            Operator::Store => write!(f, "store"),
            Operator::DestroyValue => write!(f, "destroy_value"),
            Operator::DestroyAddr => write!(f, "destroy_addr"),
            Operator::EndBorrow => write!(f, "end_borrow"),
            Operator::EndAccess => write!(f, "end_access"),
            Operator::Struct => write!(f, "struct"),
            Operator::Tuple => write!(f, "tuple"),
            Operator::Enum { case } => write!(f, "enum<#{}>", case),
            Operator::StructExtract { field } => write!(f, "struct_extract<#{}>", field),
            Operator::TupleExtract { index } => write!(f, "tuple_extract<#{}>", index),
            Operator::UncheckedEnumData { case } => write!(f, "unchecked_enum_data<#{}>", case),
            Operator::DestructureStruct => write!(f, "destructure_struct"),
            Operator::DestructureTuple => write!(f, "destructure_tuple"),
            Operator::BeginBorrow => write!(f, "begin_borrow"),
            Operator::CopyValue => write!(f, "copy_value"),
            Operator::UnwrapValue => write!(f, "unwrap_value"),
            Operator::StructElementAddr { field } => write!(f, "struct_element_addr<#{}>", field),
            Operator::TupleElementAddr { index } => write!(f, "tuple_element_addr<#{}>", index),
            Operator::TakeEnumDataAddr { case } => write!(f, "take_enum_data_addr<#{}>", case),
            Operator::InitEnumDataAddr { case } => write!(f, "init_enum_data_addr<#{}>", case),
            Operator::BeginAccess => write!(f, "begin_access"),
            Operator::StoreBorrow => write!(f, "store_borrow"),
            Operator::ProjectBox => write!(f, "project_box"),
            Operator::UnwrapAddr => write!(f, "unwrap_addr"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockTarget {
    pub block: Block,
    pub args: Vec<Value>,
}

impl std::fmt::Display for BlockTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let args = self
            .args
            .iter()
            .map(|arg| format!("{}", arg))
            .collect::<Vec<_>>();
        write!(f, "{}({})", self.block, args.join(", "))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Terminator {
    Br {
        target: BlockTarget,
    },
    CondBr {
        cond: Value,
        if_true: BlockTarget,
        if_false: BlockTarget,
    },
    Switch {
        value: Value,
        targets: Vec<BlockTarget>,
        default: BlockTarget,
    },
    Return {
        values: Vec<Value>,
    },
    Unreachable,
    None,
}

impl std::default::Default for Terminator {
    fn default() -> Self {
        Terminator::None
    }
}

impl std::fmt::Display for Terminator {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Terminator::None => write!(f, "no_terminator")?,
            Terminator::Br { target } => write!(f, "br {}", target)?,
            Terminator::CondBr {
                cond,
                if_true,
                if_false,
            } => write!(f, "if {}, {}, {}", cond, if_true, if_false)?,
            Terminator::Switch {
                value,
                targets,
                default,
            } => write!(
                f,
                "switch {}, [{}], {}",
                value,
                targets
                    .iter()
                    .map(|target| format!("{}", target))
                    .collect::<Vec<_>>()
                    .join(", "),
                default
            )?,
            Terminator::Return { values } => write!(
                f,
                "return {}",
                values
                    .iter()
                    .map(|val| format!("{}", val))
                    .collect::<Vec<_>>()
                    .join(", ")
            )?,
            Terminator::Unreachable => write!(f, "unreachable")?,
        }
        Ok(())
    }
}

impl Terminator {
    pub fn visit_targets<F: FnMut(&BlockTarget)>(&self, mut f: F) {
        match self {
            Terminator::Br { target } => f(target),
            Terminator::CondBr {
                if_true,
                if_false,
                ..
            } => {
                f(if_true);
                f(if_false);
            }
            Terminator::Switch {
                targets,
                default,
                ..
            } => {
                for target in targets {
                    f(target);
                }
                f(default);
            }
            Terminator::Return { .. } | Terminator::Unreachable | Terminator::None => {}
        }
    }

    pub fn visit_successors<F: FnMut(Block)>(&self, mut f: F) {
        self.visit_targets(|target| f(target.block));
    }
}
