// src/testgen/mod.rs
// Generated-tests companion changes: branch, commit, pull request, registration

use crate::analysis::types::{AnalysisRequest, ChangeRef, TestScenario};
use crate::github::CommitFile;
use crate::state::AppState;
use crate::store::CompanionChange;
use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

pub fn companion_branch(pr_number: i64) -> String {
    format!("vigil/tests-pr-{pr_number}")
}

/// Companion titles carry the loop-guard marker so we never analyze our own
/// output
pub fn companion_title(pr_number: i64) -> String {
    format!("[Vigil] Automated tests for PR #{pr_number}")
}

/// Generate tests for a change and open them as a companion pull request
/// against the change's own branch. Registration in the store is what lets
/// later check_run failures find their way back to the remediation loop.
pub async fn create_companion_change(
    state: &AppState,
    request: &AnalysisRequest,
    head_sha: &str,
    scenarios: &[TestScenario],
) -> Result<CompanionChange> {
    let change = &request.change;

    let files = state
        .capability
        .generate_tests(request, scenarios)
        .await
        .context("Test generation failed")?;
    if files.is_empty() {
        anyhow::bail!("Capability produced no test files for {change}");
    }

    let artifacts: Vec<CommitFile> = files
        .into_iter()
        .map(|f| CommitFile {
            path: f.path,
            content: f.content,
        })
        .collect();
    let branch = companion_branch(change.number);

    state
        .host
        .create_branch(&change.repo, request.credential, &branch, head_sha)
        .await
        .with_context(|| format!("Failed to create branch {branch}"))?;

    let message = format!("Add automated tests for PR #{}", change.number);
    state
        .host
        .commit_files(
            &change.repo,
            request.credential,
            &branch,
            &message,
            &artifacts,
        )
        .await
        .context("Failed to commit generated tests")?;

    let title = companion_title(change.number);
    let body = format_companion_body(change, scenarios, &artifacts);
    let companion_pr = state
        .host
        .open_pull_request(
            &change.repo,
            request.credential,
            &title,
            &body,
            &branch,
            &request.head_branch,
        )
        .await
        .context("Failed to open companion pull request")?;

    let companion = CompanionChange {
        id: Uuid::new_v4().to_string(),
        repo: change.repo.clone(),
        source_pr: change.number,
        companion_pr,
        branch: branch.clone(),
        artifacts,
        created_at: Utc::now(),
    };

    // Without registration, later check failures cannot be routed back here
    state
        .store
        .register_companion(&companion)
        .await
        .context("Failed to register companion change")?;

    state.live.companion_opened(change, companion_pr, &branch);

    let link_comment = format!(
        "🧪 Opened #{companion_pr} with generated tests for this change ({} file(s)). Review and merge it to add coverage.",
        companion.artifacts.len()
    );
    if let Err(e) = state
        .host
        .post_comment(change, request.credential, &link_comment)
        .await
    {
        warn!("Failed to post companion link comment: {e:#}");
    }

    info!(source = %change, companion_pr, "Opened companion test change");
    Ok(companion)
}

fn format_companion_body(
    change: &ChangeRef,
    scenarios: &[TestScenario],
    artifacts: &[CommitFile],
) -> String {
    let mut body = format!("Automated tests generated for #{}.\n\n", change.number);

    if !scenarios.is_empty() {
        body.push_str("**Scenarios covered:**\n");
        for scenario in scenarios {
            body.push_str(&format!("- {}: {}\n", scenario.name, scenario.description));
        }
        body.push('\n');
    }

    body.push_str("**Files:**\n");
    for file in artifacts {
        body.push_str(&format!("- `{}`\n", file.path));
    }
    body.push_str("\nIf CI fails on this change, Vigil will attempt to repair it automatically.\n");
    body
}
