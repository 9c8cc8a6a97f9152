//! fieldlive: field-sensitive pruned liveness and lifetime boundaries.

pub mod cfg;
pub mod entity;
mod errors;
mod ir;
pub mod leaf;
pub mod liveness;
mod options;

pub use errors::*;
pub use ir::*;
pub use leaf::{leaf_count, LeafBits, LeafRange};
pub use liveness::{Boundary, IsLive, MultiDefLiveRange, SsaLiveRange, UseKind};
pub use options::*;

#[cfg(feature = "fuzzing")]
pub mod fuzzing;
