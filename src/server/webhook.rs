// src/server/webhook.rs
// GitHub webhook dispatch: one endpoint, routed by X-GitHub-Event

use axum::{extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::analysis;
use crate::analysis::command::Command;
use crate::analysis::types::{ChangeAction, CheckFailure};
use crate::github::events::{CheckRunEvent, IssueCommentEvent, PullRequestEvent};
use crate::remediation;
use crate::server::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Pull-request actions that trigger an automatic run
const ANALYZABLE_ACTIONS: [&str; 3] = ["opened", "synchronize", "reopened"];

pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> ApiResult<Json<Value>> {
    let event_type = headers
        .get("x-github-event")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("Missing X-GitHub-Event header"))?
        .to_string();

    debug!(event_type, "Webhook delivery received");

    match event_type.as_str() {
        "ping" => Ok(Json(json!({ "status": "pong" }))),
        "pull_request" => handle_pull_request(state, payload).await,
        "issue_comment" => handle_issue_comment(state, payload).await,
        "check_run" => handle_check_run(state, payload).await,
        other => {
            debug!(event_type = other, "Unhandled event type");
            Ok(ignored())
        }
    }
}

fn ignored() -> Json<Value> {
    Json(json!({ "status": "ignored" }))
}

async fn handle_pull_request(state: AppState, payload: Value) -> ApiResult<Json<Value>> {
    let event: PullRequestEvent = serde_json::from_value(payload)
        .map_err(|e| ApiError::bad_request(format!("Malformed pull_request payload: {e}")))?;

    if !ANALYZABLE_ACTIONS.contains(&event.action.as_str()) {
        return Ok(ignored());
    }

    let summary = event
        .change_summary()
        .ok_or_else(|| ApiError::bad_request("pull_request delivery is missing identifiers"))?;
    let action = event
        .action
        .parse::<ChangeAction>()
        .map_err(ApiError::bad_request)?;

    match analysis::run_change_event(&state, &summary, action).await {
        Ok(Some(record)) => Ok(Json(json!({ "status": "analyzed", "id": record.id }))),
        Ok(None) => Ok(ignored()),
        Err(e) => Err(ApiError::internal(format!("Analysis failed: {e:#}"))),
    }
}

async fn handle_issue_comment(state: AppState, payload: Value) -> ApiResult<Json<Value>> {
    let event: IssueCommentEvent = serde_json::from_value(payload)
        .map_err(|e| ApiError::bad_request(format!("Malformed issue_comment payload: {e}")))?;

    let Some((change, body)) = event.pull_request_comment() else {
        // Only fresh human comments on pull requests matter. A created
        // delivery that still lacks its identifiers is malformed; the rest
        // (bots, plain issues, edits) are simply not ours.
        if event.action == "created"
            && (event.comment.is_none() || event.issue.is_none() || event.repository.is_none())
        {
            return Err(ApiError::bad_request(
                "issue_comment delivery is missing identifiers",
            ));
        }
        return Ok(ignored());
    };

    let Some(command) = Command::parse(body) else {
        return Ok(ignored());
    };

    info!(%change, command = command.as_str(), "Webhook command received");
    analysis::run_command(&state, &change, event.credential(), command)
        .await
        .map_err(|e| ApiError::internal(format!("Command failed: {e:#}")))?;

    Ok(Json(json!({ "status": "command", "command": command.as_str() })))
}

async fn handle_check_run(state: AppState, payload: Value) -> ApiResult<Json<Value>> {
    let event: CheckRunEvent = serde_json::from_value(payload)
        .map_err(|e| ApiError::bad_request(format!("Malformed check_run payload: {e}")))?;

    if let Some(failure) = event.failure() {
        return route_check_failure(state, failure).await;
    }
    if event.succeeded() {
        return clear_failure_streak(state, &event).await;
    }

    Ok(ignored())
}

/// Failed checks matter only on branches Vigil itself created; everything
/// else is some other CI concern.
async fn route_check_failure(state: AppState, failure: CheckFailure) -> ApiResult<Json<Value>> {
    if failure.head_branch.is_empty() {
        debug!(check = %failure.check_name, "Check failure without a head branch; cannot route");
        return Ok(ignored());
    }

    let companion = state
        .store
        .companion_by_branch(&failure.repo, &failure.head_branch)
        .await
        .map_err(|e| ApiError::internal(format!("Companion lookup failed: {e:#}")))?;

    let Some(companion) = companion else {
        debug!(branch = %failure.head_branch, "Check failure on an unregistered branch");
        return Ok(ignored());
    };

    info!(
        change = %companion.change(),
        check = %failure.check_name,
        "Check failure on a companion change; starting remediation"
    );
    match remediation::attempt_auto_fix(&state, &companion, &failure).await {
        Ok(run) => Ok(Json(json!({
            "status": "remediation",
            "outcome": run.status.as_str(),
            "attempts": run.attempts_used,
        }))),
        Err(e) => Err(ApiError::internal(format!("Remediation failed: {e:#}"))),
    }
}

/// A green check on a companion ends its failure streak. The attempt counter
/// is deliberately left alone: it is a per-companion lifetime budget, not a
/// per-streak one.
async fn clear_failure_streak(state: AppState, event: &CheckRunEvent) -> ApiResult<Json<Value>> {
    let (Some(branch), Some(repo)) = (
        event.head_branch(),
        event.repository.as_ref().map(|r| r.repo_ref()),
    ) else {
        return Ok(ignored());
    };

    let companion = match state.store.companion_by_branch(&repo, branch).await {
        Ok(companion) => companion,
        Err(e) => {
            warn!("Companion lookup failed while clearing a streak: {e:#}");
            return Ok(ignored());
        }
    };
    let Some(companion) = companion else {
        return Ok(ignored());
    };

    match state.store.remediation_state(&companion.id).await {
        Ok(Some((attempts, status))) => match status.as_str() {
            // Human outcomes stay on the record even after checks go green
            "needs_human" | "unfixable" => {
                debug!(change = %companion.change(), status, "Checks passing; terminal status retained");
            }
            "fixed" => {}
            _ => {
                info!(change = %companion.change(), attempts, "Checks passing; clearing failure streak");
                if let Err(e) = state
                    .store
                    .set_remediation_status(&companion.id, "fixed")
                    .await
                {
                    warn!("Failed to clear failure streak: {e:#}");
                }
                state.live.remediation_update(&companion.change(), attempts, "fixed");
            }
        },
        Ok(None) => {}
        Err(e) => warn!("Failed to read remediation state: {e:#}"),
    }

    Ok(Json(json!({ "status": "checks-passing" })))
}
