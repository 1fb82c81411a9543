// src/analysis/types.rs
// Domain types shared across the analysis pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Change identity
// ============================================================================

/// A repository on the host, e.g. "acme/billing"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Identifies one change (pull request) on the host
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeRef {
    pub repo: RepoRef,
    pub number: i64,
}

impl fmt::Display for ChangeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repo, self.number)
    }
}

/// Opaque token identifying which host credential to act under.
/// We never interpret the value; it is echoed back to the host client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialHandle(pub i64);

impl fmt::Display for CredentialHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What happened to the change, as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Opened,
    Synchronize,
    Reopened,
    Closed,
    Edited,
    /// Run requested via a `/vigil` comment rather than a change event
    Commanded,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Opened => "opened",
            ChangeAction::Synchronize => "synchronize",
            ChangeAction::Reopened => "reopened",
            ChangeAction::Closed => "closed",
            ChangeAction::Edited => "edited",
            ChangeAction::Commanded => "commanded",
        }
    }
}

impl std::str::FromStr for ChangeAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "opened" => Ok(ChangeAction::Opened),
            "synchronize" => Ok(ChangeAction::Synchronize),
            "reopened" => Ok(ChangeAction::Reopened),
            "closed" => Ok(ChangeAction::Closed),
            "edited" => Ok(ChangeAction::Edited),
            "commanded" => Ok(ChangeAction::Commanded),
            other => Err(format!("unknown change action '{other}'")),
        }
    }
}

/// Snapshot of a change as delivered by the webhook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub change: ChangeRef,
    pub title: String,
    pub body: String,
    pub author: String,
    pub head_sha: String,
    pub head_branch: String,
    pub base_branch: String,
    pub draft: bool,
    pub credential: CredentialHandle,
}

/// One file from the change's diff listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangedFile {
    pub path: String,
    pub status: String, // "added", "modified", "removed", "renamed"
    pub additions: i64,
    pub deletions: i64,
    /// Unified diff hunk; absent for binary or oversized files
    pub patch: Option<String>,
}

/// Everything the analyzers need about one change. Assembled by the
/// orchestrator after fetching; immutable from then on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub change: ChangeRef,
    pub title: String,
    pub head_branch: String,
    pub body: String,
    pub action: ChangeAction,
    pub diff: String,
    pub files: Vec<ChangedFile>,
    pub credential: CredentialHandle,
}

// ============================================================================
// Check failures (remediation input)
// ============================================================================

/// A single annotation attached to a failed check run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckAnnotation {
    pub path: String,
    pub start_line: i64,
    pub message: String,
}

/// A failed check run on some branch, as reported by the host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckFailure {
    pub repo: RepoRef,
    pub check_run_id: i64,
    pub check_name: String,
    pub head_sha: String,
    pub head_branch: String,
    pub credential: CredentialHandle,
}

// ============================================================================
// Risk model (capability output)
// ============================================================================

/// Severity scale shared by the overall verdict, findings, and gaps
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discrete risk identified in the change
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Finding {
    pub level: RiskLevel,
    /// Where the risk lives, e.g. "auth", "payments", "migration"
    pub area: String,
    pub description: String,
    /// Concrete guidance for reducing or removing the risk
    #[serde(default)]
    pub mitigation: String,
}

/// A missing or ambiguous requirement/coverage item, distinct from a finding
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Gap {
    pub description: String,
    pub severity: RiskLevel,
}

/// A test the change ought to have, phrased as a runnable scenario
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct TestScenario {
    pub name: String,
    pub description: String,
}

/// Ternary verdict on whether the change is safe to merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MergeRecommendation {
    MergeOk,
    Attention,
    Block,
}

impl MergeRecommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeRecommendation::MergeOk => "merge_ok",
            MergeRecommendation::Attention => "attention",
            MergeRecommendation::Block => "block",
        }
    }
}

/// Aggregate output of one analysis run. Immutable once built; handed to
/// persistence and notification collaborators by value.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct AnalysisResult {
    pub risk_level: RiskLevel,
    /// 0-100, 100 = worst. Capability judgment, not derived from findings.
    pub risk_score: u8,
    pub merge_recommendation: MergeRecommendation,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub gaps: Vec<Gap>,
    #[serde(default)]
    pub scenarios: Vec<TestScenario>,
}

impl AnalysisResult {
    pub fn finding_count(&self, level: RiskLevel) -> usize {
        self.findings.iter().filter(|f| f.level == level).count()
    }

    pub fn critical_gap_count(&self) -> usize {
        self.gaps
            .iter()
            .filter(|g| g.severity == RiskLevel::Critical)
            .count()
    }

    /// True when at least one finding justifies a `block` recommendation
    pub fn has_blocking_findings(&self) -> bool {
        self.findings
            .iter()
            .any(|f| matches!(f.level, RiskLevel::Critical | RiskLevel::High))
    }
}

// ============================================================================
// Auxiliary analyzer output
// ============================================================================

/// Rough estimate of how much of the change is exercised by tests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageSignal {
    pub source_files_changed: usize,
    pub test_files_changed: usize,
    /// Source files that appear to have a companion test touched in the same change
    pub covered_files: usize,
}

impl CoverageSignal {
    /// Fraction of changed source files with an apparent companion test
    pub fn covered_ratio(&self) -> f64 {
        if self.source_files_changed == 0 {
            return 1.0;
        }
        self.covered_files as f64 / self.source_files_changed as f64
    }
}

/// Manifest changes that deserve a human look
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyAudit {
    pub manifests_changed: Vec<String>,
    pub alerts: Vec<String>,
}

// ============================================================================
// Governed health
// ============================================================================

/// Health status derived from the governed score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Attention,
    Degraded,
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Attention => "attention",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Critical => "critical",
        }
    }
}

/// Direction the change pushes the codebase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Stable,
    Degrading,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Improving => "improving",
            Trend::Stable => "stable",
            Trend::Degrading => "degrading",
        }
    }
}

/// Deterministic health view, always recomputed from an AnalysisResult.
/// Score polarity is inverse to risk_score: 100 = healthiest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductHealth {
    pub score: u8,
    pub status: HealthStatus,
    pub trend: Trend,
}

impl ProductHealth {
    /// Label the host should carry for this health state, e.g. "vigil:healthy"
    pub fn status_label(&self) -> String {
        format!("vigil:{}", self.status.as_str())
    }
}

// ============================================================================
// Persisted record
// ============================================================================

/// Everything one run produced, keyed by a fresh id. This is the unit the
/// store persists and the notifiers describe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub change: ChangeRef,
    pub action: ChangeAction,
    pub result: AnalysisResult,
    pub health: ProductHealth,
    pub coverage: Option<CoverageSignal>,
    pub dependencies: Option<DependencyAudit>,
    /// Names of auxiliary analyzers that failed and were skipped
    pub skipped_analyzers: Vec<String>,
    /// sha256 of the analyzed diff, hex-encoded
    pub diff_digest: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Pipeline phases
// ============================================================================

/// Lifecycle of one analysis run. Transitions are linear; any phase after
/// LoopChecked can move to Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisPhase {
    Received,
    LoopChecked,
    Fetching,
    Analyzing,
    Aggregating,
    Reporting,
    Persisted,
    Notified,
    Done,
    Failed,
}

impl AnalysisPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisPhase::Received => "received",
            AnalysisPhase::LoopChecked => "loop_checked",
            AnalysisPhase::Fetching => "fetching",
            AnalysisPhase::Analyzing => "analyzing",
            AnalysisPhase::Aggregating => "aggregating",
            AnalysisPhase::Reporting => "reporting",
            AnalysisPhase::Persisted => "persisted",
            AnalysisPhase::Notified => "notified",
            AnalysisPhase::Done => "done",
            AnalysisPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisPhase::Done | AnalysisPhase::Failed)
    }
}
