// src/analysis/health.rs
// Deterministic health scoring. Single source of truth for status; no other
// component may classify health differently.

use crate::analysis::types::{
    AnalysisResult, HealthStatus, MergeRecommendation, ProductHealth, RiskLevel, Trend,
};

const BASE_SCORE: i32 = 100;
const CRITICAL_FINDING_PENALTY: i32 = 25;
const HIGH_FINDING_PENALTY: i32 = 10;
const MEDIUM_FINDING_PENALTY: i32 = 3;
const CRITICAL_GAP_PENALTY: i32 = 10;

/// Pure. Recomputed from the result every time; never persisted on its own.
pub fn compute_health(result: &AnalysisResult) -> ProductHealth {
    let score = score_result(result);
    ProductHealth {
        score,
        status: score_to_status(score),
        trend: trend_of(result),
    }
}

fn score_result(result: &AnalysisResult) -> u8 {
    let penalty = CRITICAL_FINDING_PENALTY * result.finding_count(RiskLevel::Critical) as i32
        + HIGH_FINDING_PENALTY * result.finding_count(RiskLevel::High) as i32
        + MEDIUM_FINDING_PENALTY * result.finding_count(RiskLevel::Medium) as i32
        + CRITICAL_GAP_PENALTY * result.critical_gap_count() as i32;
    (BASE_SCORE - penalty).clamp(0, 100) as u8
}

fn score_to_status(score: u8) -> HealthStatus {
    match score {
        80..=100 => HealthStatus::Healthy,
        60..=79 => HealthStatus::Attention,
        40..=59 => HealthStatus::Degraded,
        _ => HealthStatus::Critical,
    }
}

fn trend_of(result: &AnalysisResult) -> Trend {
    if result.finding_count(RiskLevel::Critical) > 0 {
        Trend::Degrading
    } else if result.findings.is_empty() {
        Trend::Improving
    } else {
        Trend::Stable
    }
}

/// Human-facing (label, reason) for each merge recommendation. The enum is
/// closed at deserialization, so unknown values can never reach this match.
pub fn recommendation_notice(rec: MergeRecommendation) -> (&'static str, &'static str) {
    match rec {
        MergeRecommendation::MergeOk => ("Safe to merge", "no blocking risks identified"),
        MergeRecommendation::Attention => (
            "Merge with attention",
            "review the findings below before merging",
        ),
        MergeRecommendation::Block => (
            "Do not merge",
            "critical or high risks must be resolved first",
        ),
    }
}
