// src/analysis/trigger.rs
// Maps the configured trigger mode to per-run pipeline decisions

use crate::analysis::error::AnalysisError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How analysis runs are initiated. Parsed once at config load; an
/// unrecognized mode string is a configuration error, not a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    /// Analyze every change event and comment on the PR
    Auto,
    /// Analyze every change event silently; comment only on command
    Hybrid,
    /// Do nothing until asked via a `/vigil` comment
    Command,
}

impl TriggerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerMode::Auto => "auto",
            TriggerMode::Hybrid => "hybrid",
            TriggerMode::Command => "command",
        }
    }

    /// The exhaustive mode table. Every mode yields exactly one decision;
    /// there is deliberately no fallback arm.
    pub fn resolve(self) -> TriggerDecision {
        match self {
            TriggerMode::Auto => TriggerDecision {
                analyze_dashboard: true,
                comment_on_pr: true,
            },
            TriggerMode::Hybrid => TriggerDecision {
                analyze_dashboard: true,
                comment_on_pr: false,
            },
            TriggerMode::Command => TriggerDecision {
                analyze_dashboard: false,
                comment_on_pr: false,
            },
        }
    }
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerMode {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(TriggerMode::Auto),
            "hybrid" => Ok(TriggerMode::Hybrid),
            "command" => Ok(TriggerMode::Command),
            other => Err(AnalysisError::InvalidTriggerMode(other.to_string())),
        }
    }
}

/// What one run is allowed to do, decided once at the start of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerDecision {
    /// Run the analysis pipeline for dashboard/persistence purposes
    pub analyze_dashboard: bool,
    /// Post the visible PR comment and apply labels ("full" pipeline)
    pub comment_on_pr: bool,
}
