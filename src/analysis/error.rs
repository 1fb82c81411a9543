// src/analysis/error.rs

use crate::analysis::types::AnalysisPhase;

/// Fatal errors that abort an analysis run. Auxiliary analyzer failures and
/// side-effect failures (comment, labels, persistence, events, chat) are
/// handled inline by the orchestrator and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("invalid trigger mode '{0}' (expected auto, hybrid, or command)")]
    InvalidTriggerMode(String),

    #[error("failed to fetch change content: {0:#}")]
    Fetch(anyhow::Error),

    #[error("analysis capability failed: {0:#}")]
    Capability(anyhow::Error),

    #[error("capability returned an unusable verdict: {0}")]
    MalformedVerdict(String),

    #[error("failed to post the analysis comment: {0:#}")]
    Report(anyhow::Error),
}

impl AnalysisError {
    /// Phase the pipeline was in when the error occurred
    pub fn phase(&self) -> AnalysisPhase {
        match self {
            AnalysisError::InvalidTriggerMode(_) => AnalysisPhase::Received,
            AnalysisError::Fetch(_) => AnalysisPhase::Fetching,
            AnalysisError::Capability(_) | AnalysisError::MalformedVerdict(_) => {
                AnalysisPhase::Analyzing
            }
            AnalysisError::Report(_) => AnalysisPhase::Reporting,
        }
    }
}
