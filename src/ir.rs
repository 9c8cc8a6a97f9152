//! Intermediate representation consumed by the liveness analysis.
//!
//! The analysis only ever reads this IR: blocks with ordered
//! instructions, predecessor/successor lists, block parameters, and a
//! structural type store.

use crate::declare_entity;

declare_entity!(Block, "block");
declare_entity!(Value, "v");
declare_entity!(Type, "ty");

mod types;
pub use types::*;
mod func;
pub use func::*;
mod value;
pub use value::*;
mod display;
pub use display::*;
