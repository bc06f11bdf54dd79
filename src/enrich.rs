//! Text-generation collaborator extension point
//!
//! The engine itself never talks to a language model; it exposes this
//! seam for one. When no enricher is configured every consumer degrades
//! to a fixed descriptive placeholder rather than erroring.

use crate::record::ScanRecord;

/// Placeholder returned whenever the capability is not configured
pub const UNAVAILABLE: &str = "analysis unavailable";

/// Summary and tag suggestions for one result
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    pub summary: Option<String>,
    pub tags: Vec<String>,
}

/// External text-generation capability
pub trait Enricher {
    /// Summarize a result and suggest tags for it
    fn analyze(&self, record: &ScanRecord) -> Option<Analysis>;

    /// Answer a free-form question over stored results
    fn answer(&self, question: &str, context: &[ScanRecord]) -> Option<String>;

    /// Draft an assessment plan toward a goal
    fn plan(&self, goal: &str, context: &[ScanRecord]) -> Option<String>;

    /// Produce example invocations for a module
    fn explore(&self, module: &str) -> Option<String>;
}
