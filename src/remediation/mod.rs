// src/remediation/mod.rs
// Bounded auto-fix loop for failing checks on generated-test changes

pub mod diagnostics;

use crate::analysis::types::{ChangeRef, CheckFailure, CredentialHandle};
use crate::github::CommitFile;
use crate::llm::schema::FixPayload;
use crate::state::AppState;
use crate::store::CompanionChange;
use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationStatus {
    Fixing,
    Fixed,
    NeedsHuman,
    Unfixable,
}

impl RemediationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemediationStatus::Fixing => "fixing",
            RemediationStatus::Fixed => "fixed",
            RemediationStatus::NeedsHuman => "needs_human",
            RemediationStatus::Unfixable => "unfixable",
        }
    }

    fn from_stored(s: &str) -> Option<Self> {
        match s {
            "fixing" => Some(RemediationStatus::Fixing),
            "fixed" => Some(RemediationStatus::Fixed),
            "needs_human" => Some(RemediationStatus::NeedsHuman),
            "unfixable" => Some(RemediationStatus::Unfixable),
            _ => None,
        }
    }
}

/// One try within the auto-fix loop. Numbers are absolute for the
/// companion, so a resumed run starts above 1.
#[derive(Debug, Clone)]
pub struct RemediationAttempt {
    pub number: u32,
    /// The fix the capability proposed, when it proposed one
    pub fix: Option<FixPayload>,
    pub succeeded: bool,
    pub error: Option<String>,
}

/// Outcome of one invocation of the auto-fix loop
#[derive(Debug, Clone)]
pub struct RemediationRun {
    pub companion_id: String,
    pub status: RemediationStatus,
    /// Tries made by this invocation, in order
    pub attempts: Vec<RemediationAttempt>,
    /// Cumulative count for the companion, including earlier invocations
    pub attempts_used: u32,
}

impl RemediationRun {
    /// Error detail from the most recent failed try of this invocation
    pub fn last_error(&self) -> Option<&str> {
        self.attempts.iter().rev().find_map(|a| a.error.as_deref())
    }
}

/// Try to fix the failing checks on a companion change, bounded by the
/// configured attempt cap. The cap is cumulative across invocations: each
/// new failing check event resumes where the last run stopped. "Fixed"
/// means a fix was committed, not that the re-run checks went green; a
/// recurring failure re-enters the loop through the next check event.
pub async fn attempt_auto_fix(
    state: &AppState,
    companion: &CompanionChange,
    failure: &CheckFailure,
) -> Result<RemediationRun> {
    let max_attempts = state.config.max_fix_attempts;
    let change = companion.change();

    let prior = match state.store.remediation_state(&companion.id).await {
        Ok(prior) => prior,
        Err(e) => {
            warn!("Remediation state lookup failed, starting fresh: {e:#}");
            None
        }
    };

    if let Some((attempts, status)) = &prior {
        if let Some(terminal) = RemediationStatus::from_stored(status) {
            if matches!(
                terminal,
                RemediationStatus::NeedsHuman | RemediationStatus::Unfixable
            ) {
                info!(companion = %change, status = %status, "Remediation already terminal, ignoring new failure");
                return Ok(RemediationRun {
                    companion_id: companion.id.clone(),
                    status: terminal,
                    attempts: Vec::new(),
                    attempts_used: *attempts,
                });
            }
        }
    }

    let prior_attempts = prior.map(|(attempts, _)| attempts).unwrap_or(0);
    let mut attempt = prior_attempts + 1;
    let mut attempts: Vec<RemediationAttempt> = Vec::new();

    while attempt <= max_attempts {
        state.live.remediation_update(&change, attempt, "fixing");
        if let Err(e) = state
            .store
            .record_remediation_attempt(&companion.id, attempt, RemediationStatus::Fixing.as_str())
            .await
        {
            warn!("Failed to persist remediation attempt: {e:#}");
        }

        // Fresh diagnostics every attempt; an applied-but-broken fix from a
        // previous event changes what the checks report
        let diags = diagnostics::collect_diagnostics(state.host.as_ref(), failure).await;
        if diags.is_empty() {
            info!(companion = %change, "No diagnostics available, giving up");
            attempts.push(RemediationAttempt {
                number: attempt,
                fix: None,
                succeeded: false,
                error: Some("no diagnostics available".to_string()),
            });
            if let Err(e) = state
                .store
                .set_remediation_status(&companion.id, RemediationStatus::Unfixable.as_str())
                .await
            {
                warn!("Failed to persist remediation status: {e:#}");
            }
            best_effort_comment(
                state,
                &change,
                failure.credential,
                &format_unfixable_comment(&failure.check_name),
            )
            .await;
            state.live.remediation_update(&change, attempt, "unfixable");
            return Ok(RemediationRun {
                companion_id: companion.id.clone(),
                status: RemediationStatus::Unfixable,
                attempts,
                attempts_used: attempt,
            });
        }

        match state.capability.request_fix(&diags, &companion.artifacts).await {
            Ok(Some(fix)) => match apply_fix(state, companion, failure, attempt, &fix).await {
                Ok(()) => {
                    attempts.push(RemediationAttempt {
                        number: attempt,
                        fix: Some(fix),
                        succeeded: true,
                        error: None,
                    });
                    if let Err(e) = state
                        .store
                        .record_remediation_attempt(
                            &companion.id,
                            attempt,
                            RemediationStatus::Fixed.as_str(),
                        )
                        .await
                    {
                        warn!("Failed to persist remediation status: {e:#}");
                    }
                    state.live.remediation_update(&change, attempt, "fixed");
                    if let Err(e) = state
                        .chat
                        .send_action_report(&format!(
                            "Vigil committed a fix for failing checks on {change} (attempt {attempt}/{max_attempts})"
                        ))
                        .await
                    {
                        warn!("Chat notification failed: {e:#}");
                    }
                    return Ok(RemediationRun {
                        companion_id: companion.id.clone(),
                        status: RemediationStatus::Fixed,
                        attempts,
                        attempts_used: attempt,
                    });
                }
                Err(e) => {
                    warn!(companion = %change, attempt, "Fix application failed: {e:#}");
                    attempts.push(RemediationAttempt {
                        number: attempt,
                        fix: Some(fix),
                        succeeded: false,
                        error: Some(format!("{e:#}")),
                    });
                }
            },
            Ok(None) => {
                info!(companion = %change, attempt, "Capability returned no usable fix");
                attempts.push(RemediationAttempt {
                    number: attempt,
                    fix: None,
                    succeeded: false,
                    error: Some("capability returned no usable fix".to_string()),
                });
            }
            Err(e) => {
                warn!(companion = %change, attempt, "Fix request failed: {e:#}");
                attempts.push(RemediationAttempt {
                    number: attempt,
                    fix: None,
                    succeeded: false,
                    error: Some(format!("{e:#}")),
                });
            }
        }

        attempt += 1;
    }

    // Attempts exhausted
    let run = RemediationRun {
        companion_id: companion.id.clone(),
        status: RemediationStatus::NeedsHuman,
        attempts,
        attempts_used: max_attempts,
    };
    if let Err(e) = state
        .store
        .set_remediation_status(&companion.id, RemediationStatus::NeedsHuman.as_str())
        .await
    {
        warn!("Failed to persist remediation status: {e:#}");
    }
    best_effort_comment(
        state,
        &change,
        failure.credential,
        &format_needs_human_comment(max_attempts, run.last_error()),
    )
    .await;
    if let Err(e) = state
        .chat
        .send_critical_alert(&format!(
            "Generated tests on {change} are still failing after {max_attempts} fix attempts; human attention needed"
        ))
        .await
    {
        warn!("Chat notification failed: {e:#}");
    }
    state.live.remediation_update(&change, max_attempts, "needs_human");

    Ok(run)
}

/// Commit the fix to the companion branch, refresh stored artifacts, and
/// leave an explanatory comment. Only the commit failure is an error here.
async fn apply_fix(
    state: &AppState,
    companion: &CompanionChange,
    failure: &CheckFailure,
    attempt: u32,
    fix: &FixPayload,
) -> Result<()> {
    let files: Vec<CommitFile> = fix
        .files
        .iter()
        .map(|f| CommitFile {
            path: f.path.clone(),
            content: f.content.clone(),
        })
        .collect();

    let message = format!("Fix failing checks (attempt {attempt})");
    let sha = state
        .host
        .commit_files(
            &companion.repo,
            failure.credential,
            &companion.branch,
            &message,
            &files,
        )
        .await?;
    info!(companion = %companion.change(), %sha, "Committed fix");

    // Keep stored artifacts matching what is now on the branch
    let merged = merge_artifacts(&companion.artifacts, &files);
    if let Err(e) = state
        .store
        .update_companion_artifacts(&companion.id, &merged)
        .await
    {
        warn!("Failed to refresh companion artifacts: {e:#}");
    }

    best_effort_comment(
        state,
        &companion.change(),
        failure.credential,
        &format_fix_comment(attempt, fix),
    )
    .await;

    Ok(())
}

async fn best_effort_comment(
    state: &AppState,
    change: &ChangeRef,
    credential: CredentialHandle,
    body: &str,
) {
    if let Err(e) = state.host.post_comment(change, credential, body).await {
        warn!(%change, "Failed to post remediation comment: {e:#}");
    }
}

/// Replace matching paths, append new ones
fn merge_artifacts(existing: &[CommitFile], updates: &[CommitFile]) -> Vec<CommitFile> {
    let mut merged: Vec<CommitFile> = existing.to_vec();
    for update in updates {
        match merged.iter_mut().find(|f| f.path == update.path) {
            Some(slot) => slot.content = update.content.clone(),
            None => merged.push(update.clone()),
        }
    }
    merged
}

fn format_fix_comment(attempt: u32, fix: &FixPayload) -> String {
    let mut body = format!("## Vigil Auto-Fix (attempt {attempt})\n\n{}\n", fix.explanation);
    body.push_str("\n**Files updated:**\n");
    for file in &fix.files {
        body.push_str(&format!("- `{}`\n", file.path));
    }
    body
}

fn format_needs_human_comment(attempts: u32, last_error: Option<&str>) -> String {
    let mut body = format!(
        "## Vigil Auto-Fix\n\nAutomated remediation stopped after {attempts} attempt(s); these tests need human attention.\n"
    );
    if let Some(err) = last_error {
        body.push_str(&format!("\nLast error:\n```\n{err}\n```\n"));
    }
    body
}

fn format_unfixable_comment(check_name: &str) -> String {
    format!(
        "## Vigil Auto-Fix\n\nCheck `{check_name}` failed but exposed no diagnostics (no annotations, check output, or job log), so there is nothing to work from. Please investigate manually."
    )
}
