//! Analysis configuration.

/// Options controlling a live-range analysis.
#[derive(Clone, Debug, Default)]
pub struct LivenessOptions {
    /// Report projection chains the leaf model cannot interpret as
    /// `AnalysisError::UnsupportedProjection` rather than as an unknown
    /// (`None`) range.
    pub strict_projections: bool,
    /// Check that every use recorded on a single-definition live range
    /// is dominated by the definition. Builds a `CFGInfo` for the body.
    pub verify_ssa_dominance: bool,
}

impl LivenessOptions {
    pub fn strict() -> Self {
        Self {
            strict_projections: true,
            verify_ssa_dominance: true,
        }
    }
}
