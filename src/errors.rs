//! Error types.

use crate::ir::Value;

/// A recoverable error reported by the analysis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnalysisError {
    /// A projection chain from a derived value back to its root
    /// contains an instruction the leaf model does not know how to
    /// look through. Only reported with `strict_projections`.
    UnsupportedProjection { derived: Value, at: Value },
    /// A value in the projection chain has no single result type.
    UntypedValue(Value),
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

impl std::error::Error for AnalysisError {}
