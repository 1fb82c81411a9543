// src/analysis/mod.rs
// Orchestrates one analysis run: guard, fetch, analyze, aggregate, report, persist, notify

pub mod command;
pub mod coverage;
pub mod dependencies;
pub mod error;
pub mod health;
pub mod loop_guard;
pub mod report;
pub mod trigger;
pub mod types;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::analysis::command::Command;
use crate::analysis::error::AnalysisError;
use crate::analysis::trigger::TriggerDecision;
use crate::analysis::types::{
    AnalysisRecord, AnalysisRequest, AnalysisResult, ChangeAction, ChangeRef, ChangeSummary,
    ChangedFile, CoverageSignal, CredentialHandle, DependencyAudit, Gap, MergeRecommendation,
    RiskLevel,
};
use crate::github::ChangeDetails;
use crate::state::AppState;
use crate::testgen;

/// Deterministic analyzers that run alongside the capability call.
///
/// Behind a trait so tests can make individual analyzers fail; the production
/// implementation wraps the pure functions in [`coverage`] and [`dependencies`].
#[async_trait]
pub trait AuxAnalyzers: Send + Sync {
    async fn coverage(&self, files: &[ChangedFile]) -> Result<Option<CoverageSignal>>;
    async fn dependencies(&self, files: &[ChangedFile], diff: &str) -> Result<DependencyAudit>;
}

pub struct HeuristicAnalyzers;

#[async_trait]
impl AuxAnalyzers for HeuristicAnalyzers {
    async fn coverage(&self, files: &[ChangedFile]) -> Result<Option<CoverageSignal>> {
        Ok(coverage::analyze_coverage(files))
    }

    async fn dependencies(&self, files: &[ChangedFile], diff: &str) -> Result<DependencyAudit> {
        Ok(dependencies::analyze_dependency_changes(files, diff))
    }
}

/// Entry point for pull-request webhook events.
///
/// Returns `Ok(None)` when the run is skipped without side effects: the change
/// is one Vigil generated itself, or the configured trigger mode takes no
/// automatic action. The loop guard runs before anything observable happens.
pub async fn run_change_event(
    state: &AppState,
    summary: &ChangeSummary,
    action: ChangeAction,
) -> Result<Option<AnalysisRecord>, AnalysisError> {
    if loop_guard::is_self_generated(&summary.title, &summary.head_branch) {
        info!(change = %summary.change, "Skipping self-generated change");
        return Ok(None);
    }

    let decision = state.config.trigger_mode.resolve();
    if !decision.analyze_dashboard && !decision.comment_on_pr {
        debug!(
            change = %summary.change,
            mode = state.config.trigger_mode.as_str(),
            "Trigger mode defers to explicit commands"
        );
        return Ok(None);
    }

    state.live.analysis_started(&summary.change, action);

    let outcome = async {
        let details = state
            .host
            .fetch_change_details(&summary.change, summary.credential)
            .await
            .map_err(AnalysisError::Fetch)?;
        let request = build_request(&details, action);
        execute_pipeline(state, &request, decision, &event_hints(&details.summary)).await
    }
    .await;

    match outcome {
        Ok(record) => Ok(Some(record)),
        Err(err) => {
            report_failure(
                state,
                &summary.change,
                summary.credential,
                decision.comment_on_pr,
                &err,
            )
            .await;
            Err(err)
        }
    }
}

/// Entry point for `/vigil` comment commands.
///
/// Command runs skip trigger-mode resolution: a human asked, so `analyze`
/// reports in full and `generate-tests` runs the analysis silently before
/// opening the companion change. The change is fetched first because the loop
/// guard needs the title and branch, which comment events do not carry.
pub async fn run_command(
    state: &AppState,
    change: &ChangeRef,
    credential: CredentialHandle,
    command: Command,
) -> Result<()> {
    let details = match state.host.fetch_change_details(change, credential).await {
        Ok(details) => details,
        Err(e) => {
            let err = AnalysisError::Fetch(e);
            report_failure(state, change, credential, true, &err).await;
            return Err(err.into());
        }
    };

    if loop_guard::is_self_generated(&details.summary.title, &details.summary.head_branch) {
        info!(%change, "Command targets a change Vigil generated; declining");
        best_effort_comment(
            state,
            change,
            credential,
            "Vigil commands are not available on changes Vigil generated itself.",
        )
        .await;
        return Ok(());
    }

    info!(%change, command = command.as_str(), "Running command");
    best_effort_comment(state, change, credential, &report::format_ack_comment(command)).await;

    match command {
        // The acknowledgement already carries the help table.
        Command::Help => Ok(()),
        Command::Analyze => {
            let decision = TriggerDecision {
                analyze_dashboard: true,
                comment_on_pr: true,
            };
            run_command_pipeline(state, &details, decision).await?;
            Ok(())
        }
        Command::GenerateTests => {
            let decision = TriggerDecision {
                analyze_dashboard: true,
                comment_on_pr: false,
            };
            let record = run_command_pipeline(state, &details, decision).await?;
            let request = build_request(&details, ChangeAction::Commanded);
            match testgen::create_companion_change(
                state,
                &request,
                &details.summary.head_sha,
                &record.result.scenarios,
            )
            .await
            {
                Ok(companion) => {
                    info!(%change, companion = companion.companion_pr, "Companion change ready");
                    Ok(())
                }
                Err(e) => {
                    error!(%change, "Test generation failed: {e:#}");
                    best_effort_comment(
                        state,
                        change,
                        credential,
                        &format!("⚠️ Vigil could not generate tests for this change: {e:#}"),
                    )
                    .await;
                    Err(e)
                }
            }
        }
    }
}

async fn run_command_pipeline(
    state: &AppState,
    details: &ChangeDetails,
    decision: TriggerDecision,
) -> Result<AnalysisRecord, AnalysisError> {
    let summary = &details.summary;
    state.live.analysis_started(&summary.change, ChangeAction::Commanded);

    let request = build_request(details, ChangeAction::Commanded);
    match execute_pipeline(state, &request, decision, &command_hints(summary)).await {
        Ok(record) => Ok(record),
        Err(err) => {
            // Command runs always report failures; the requester is waiting.
            report_failure(state, &summary.change, summary.credential, true, &err).await;
            Err(err)
        }
    }
}

/// The run proper, entered with the change already fetched.
///
/// The capability call and the auxiliary analyzers run concurrently. A failed
/// auxiliary drops its section and is recorded in `skipped_analyzers`; a failed
/// capability call kills the run. Reporting happens only when the decision says
/// to comment. Persistence, chat, and live updates are best-effort.
async fn execute_pipeline(
    state: &AppState,
    request: &AnalysisRequest,
    decision: TriggerDecision,
    hints: &[String],
) -> Result<AnalysisRecord, AnalysisError> {
    let change = &request.change;

    let (verdict, coverage_outcome, dependency_outcome) = tokio::join!(
        state.capability.analyze(request, hints),
        state.analyzers.coverage(&request.files),
        state.analyzers.dependencies(&request.files, &request.diff),
    );

    let mut result = verdict?;
    let mut skipped_analyzers = Vec::new();

    let coverage = match coverage_outcome {
        Ok(signal) => signal,
        Err(e) => {
            warn!(%change, "Coverage analyzer failed; dropping its section: {e:#}");
            skipped_analyzers.push("coverage".to_string());
            None
        }
    };
    let dependencies = match dependency_outcome {
        Ok(audit) => Some(audit),
        Err(e) => {
            warn!(%change, "Dependency analyzer failed; dropping its section: {e:#}");
            skipped_analyzers.push("dependencies".to_string());
            None
        }
    };

    if let Some(ref signal) = coverage {
        merge_coverage_gaps(&mut result, signal);
    }
    let health = health::compute_health(&result);

    let record = AnalysisRecord {
        id: Uuid::new_v4().to_string(),
        change: change.clone(),
        action: request.action,
        result,
        health,
        coverage,
        dependencies,
        skipped_analyzers,
        diff_digest: diff_digest(&request.diff),
        created_at: Utc::now(),
    };

    if decision.comment_on_pr {
        let comment = report::format_analysis_comment(&record);
        state
            .host
            .post_comment(change, request.credential, &comment)
            .await
            .map_err(AnalysisError::Report)?;

        let labels = report::risk_labels(&record);
        if let Err(e) = state
            .host
            .apply_risk_labels(change, request.credential, &labels)
            .await
        {
            warn!(%change, "Label application failed: {e:#}");
        }
    }

    if decision.analyze_dashboard {
        if let Err(e) = state.store.save_analysis(&record).await {
            warn!(%change, "Failed to persist analysis record: {e:#}");
        }
    }

    state.live.analysis_completed(&record);
    if let Err(e) = state.chat.send_analysis_report(&record).await {
        warn!(%change, "Chat notification failed: {e:#}");
    }
    if record.result.risk_level == RiskLevel::Critical
        || record.result.merge_recommendation == MergeRecommendation::Block
    {
        let alert = format!(
            "{} is {} risk ({}/100) with recommendation '{}'",
            change,
            record.result.risk_level,
            record.result.risk_score,
            record.result.merge_recommendation.as_str(),
        );
        if let Err(e) = state.chat.send_critical_alert(&alert).await {
            warn!(%change, "Critical alert failed: {e:#}");
        }
    }

    info!(
        %change,
        risk = %record.result.risk_level,
        score = record.result.risk_score,
        health = record.health.score,
        "Analysis complete"
    );
    Ok(record)
}

/// Failure-path reporting shared by both entry points. The error comment is
/// itself best-effort; if the run died posting a comment, this one will
/// probably fail too, and that is fine.
async fn report_failure(
    state: &AppState,
    change: &ChangeRef,
    credential: CredentialHandle,
    visible: bool,
    err: &AnalysisError,
) {
    let phase = err.phase();
    error!(%change, phase = phase.as_str(), "Analysis failed: {err:#}");
    state.live.analysis_failed(change, phase, &err.to_string());

    if visible {
        let comment = report::format_error_comment(err);
        if let Err(e) = state.host.post_comment(change, credential, &comment).await {
            warn!(%change, "Failed to post error comment: {e:#}");
        }
    }
}

async fn best_effort_comment(
    state: &AppState,
    change: &ChangeRef,
    credential: CredentialHandle,
    body: &str,
) {
    if let Err(e) = state.host.post_comment(change, credential, body).await {
        warn!(%change, "Failed to post comment: {e:#}");
    }
}

fn build_request(details: &ChangeDetails, action: ChangeAction) -> AnalysisRequest {
    let summary = &details.summary;
    AnalysisRequest {
        change: summary.change.clone(),
        title: summary.title.clone(),
        head_branch: summary.head_branch.clone(),
        body: summary.body.clone(),
        action,
        diff: details.diff.clone(),
        files: details.files.clone(),
        credential: summary.credential,
    }
}

fn event_hints(summary: &ChangeSummary) -> Vec<String> {
    let mut hints = Vec::new();
    if summary.draft {
        hints.push("The change is marked as a draft.".to_string());
    }
    hints
}

fn command_hints(summary: &ChangeSummary) -> Vec<String> {
    let mut hints = event_hints(summary);
    hints.push("The analysis was requested explicitly via a /vigil command.".to_string());
    hints
}

/// Coverage shortfalls become gaps on the primary result so health scoring and
/// the comment see one merged picture. Severity is High when the change touches
/// no test files at all, Medium when it touches some but leaves sources behind.
fn merge_coverage_gaps(result: &mut AnalysisResult, signal: &CoverageSignal) {
    let uncovered = signal
        .source_files_changed
        .saturating_sub(signal.covered_files);
    if uncovered == 0 {
        return;
    }
    let severity = if signal.test_files_changed == 0 {
        RiskLevel::High
    } else {
        RiskLevel::Medium
    };
    result.gaps.push(Gap {
        description: format!(
            "{uncovered} of {} changed source files have no companion test updates",
            signal.source_files_changed
        ),
        severity,
    });
}

fn diff_digest(diff: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(diff.as_bytes());
    format!("{:x}", hasher.finalize())
}
