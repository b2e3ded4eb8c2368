use crate::summary::SummarySource;
use serde::Serialize;
use taxonav_taxonomy::TaxonomyPath;

/// Terminal outcome of one classification.
///
/// `Failure` is its own variant rather than a magic category string, so it
/// can never be confused with a real taxonomy entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClassificationResult {
    Success { path: TaxonomyPath },
    Failure,
}

impl ClassificationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn path(&self) -> Option<&TaxonomyPath> {
        match self {
            Self::Success { path } => Some(path),
            Self::Failure => None,
        }
    }

    pub fn leaf(&self) -> Option<&str> {
        self.path().map(TaxonomyPath::leaf)
    }
}

/// What each stage produced, for display and debugging
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageTrace {
    pub summary: Option<String>,
    pub summary_source: Option<SummarySource>,
    pub top_level: Vec<String>,
    /// Stage 1 answer was replaced by the first categories in file order
    pub top_level_fallback: bool,
    pub leaves_first: Vec<String>,
    pub leaves_second: Vec<String>,
    /// Only one top-level category was selected
    pub second_branch_skipped: bool,
    /// Merged stage-2 output, in the order shown to stage 3
    pub candidates: Vec<String>,
    /// 0-based index into `candidates`
    pub final_index: Option<usize>,
    /// Stage 3 made no call (zero or one candidate)
    pub final_skipped: bool,
    pub completion_calls: usize,
    pub hallucinations: usize,
    pub dropped_batches: usize,
}

/// Result plus the trace that led to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub result: ClassificationResult,
    pub trace: StageTrace,
}
