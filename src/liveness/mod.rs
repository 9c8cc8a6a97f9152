//! Field-sensitive pruned liveness.
//!
//! Liveness is computed independently for every leaf bit of a root
//! value, pruned to the blocks between the definitions and the uses
//! the caller records (no whole-function dataflow is run). Once all
//! uses are recorded, the boundary of the live range (last users, dead
//! definitions and edges where the value becomes dead) can be computed
//! for cleanup insertion.

mod blocks;
pub use blocks::*;
mod tracker;
pub use tracker::*;
mod boundary;
pub use boundary::*;
mod range;
pub use range::*;
mod ssa;
pub use ssa::*;
mod multidef;
pub use multidef::*;
