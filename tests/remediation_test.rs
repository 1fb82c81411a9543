// tests/remediation_test.rs
// The bounded auto-fix loop: attempt budget, terminal states, resume

mod common;

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;
use common::{low_risk_result, sample_details, test_state, MockCapability, MockHost};
use vigil::analysis::trigger::TriggerMode;
use vigil::analysis::types::{CheckAnnotation, CheckFailure, CredentialHandle, RepoRef};
use vigil::github::CommitFile;
use vigil::llm::schema::{FixFile, FixPayload};
use vigil::remediation::{attempt_auto_fix, RemediationStatus};
use vigil::store::CompanionChange;

fn companion() -> CompanionChange {
    CompanionChange {
        id: "comp-1".to_string(),
        repo: RepoRef::new("acme", "billing"),
        source_pr: 42,
        companion_pr: 901,
        branch: "vigil/tests-pr-42".to_string(),
        artifacts: vec![CommitFile {
            path: "tests/rounding_test.rs".to_string(),
            content: "#[test]\nfn rounds_half_up() { assert_eq!(round(1.005), 1.0); }\n"
                .to_string(),
        }],
        created_at: Utc::now(),
    }
}

fn check_failure() -> CheckFailure {
    CheckFailure {
        repo: RepoRef::new("acme", "billing"),
        check_run_id: 555,
        check_name: "ci/test".to_string(),
        head_sha: "def456".to_string(),
        head_branch: "vigil/tests-pr-42".to_string(),
        credential: CredentialHandle(7),
    }
}

fn failing_annotation() -> CheckAnnotation {
    CheckAnnotation {
        path: "tests/rounding_test.rs".to_string(),
        start_line: 12,
        message: "assertion failed: expected 1.01, got 1.0".to_string(),
    }
}

fn usable_fix() -> FixPayload {
    FixPayload {
        explanation: "The expected value was off by a cent.".to_string(),
        files: vec![FixFile {
            path: "tests/rounding_test.rs".to_string(),
            content: "#[test]\nfn rounds_half_up() { assert_eq!(round(1.005), 1.01); }\n"
                .to_string(),
            change_type: "modify".to_string(),
        }],
        confidence: 0.9,
    }
}

#[tokio::test]
async fn test_no_diagnostics_is_terminal_after_one_attempt() {
    let host = Arc::new(MockHost::with_details(sample_details()));
    let capability = Arc::new(MockCapability::returning(low_risk_result()));
    let state = test_state(TriggerMode::Hybrid, host.clone(), capability.clone()).await;
    state.store.register_companion(&companion()).await.unwrap();

    let run = attempt_auto_fix(&state, &companion(), &check_failure())
        .await
        .unwrap();

    assert_eq!(run.status, RemediationStatus::Unfixable);
    assert_eq!(run.attempts_used, 1);
    // Nothing to feed the capability, so it was never asked
    assert_eq!(capability.fix_count(), 0);

    // The spent try is on the record, with no payload to show for it
    assert_eq!(run.attempts.len(), 1);
    assert_eq!(run.attempts[0].number, 1);
    assert!(!run.attempts[0].succeeded);
    assert!(run.attempts[0].fix.is_none());
    assert_eq!(run.last_error(), Some("no diagnostics available"));

    let comments = host.comment_bodies();
    assert_eq!(comments.len(), 1);
    assert!(comments[0].contains("no diagnostics"));

    let stored = state.store.remediation_state("comp-1").await.unwrap().unwrap();
    assert_eq!(stored, (1, "unfixable".to_string()));
}

#[tokio::test]
async fn test_successful_fix_commits_and_refreshes_artifacts() {
    let host = Arc::new(MockHost::with_details(sample_details()));
    *host.annotations.lock().unwrap() = vec![failing_annotation()];
    let capability = Arc::new(MockCapability::returning(low_risk_result()));
    *capability.fixes.lock().unwrap() = VecDeque::from([Some(usable_fix())]);
    let state = test_state(TriggerMode::Hybrid, host.clone(), capability.clone()).await;
    state.store.register_companion(&companion()).await.unwrap();

    let run = attempt_auto_fix(&state, &companion(), &check_failure())
        .await
        .unwrap();

    assert_eq!(run.status, RemediationStatus::Fixed);
    assert_eq!(run.attempts_used, 1);
    assert_eq!(capability.fix_count(), 1);

    // One successful try carrying the applied payload
    assert_eq!(run.attempts.len(), 1);
    let applied = &run.attempts[0];
    assert_eq!(applied.number, 1);
    assert!(applied.succeeded);
    assert!(applied.error.is_none());
    assert_eq!(
        applied.fix.as_ref().unwrap().files[0].path,
        "tests/rounding_test.rs"
    );

    let commits = host.commits.lock().unwrap().clone();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].0, "Fix failing checks (attempt 1)");
    assert_eq!(commits[0].1[0].path, "tests/rounding_test.rs");

    // Stored artifacts now match what landed on the branch
    let refreshed = state
        .store
        .companion_by_branch(&RepoRef::new("acme", "billing"), "vigil/tests-pr-42")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refreshed.artifacts.len(), 1);
    assert!(refreshed.artifacts[0].content.contains("1.01"));

    let comments = host.comment_bodies();
    assert_eq!(comments.len(), 1);
    assert!(comments[0].contains("Vigil Auto-Fix (attempt 1)"));

    let stored = state.store.remediation_state("comp-1").await.unwrap().unwrap();
    assert_eq!(stored, (1, "fixed".to_string()));
}

#[tokio::test]
async fn test_exhausted_attempts_escalate_to_human() {
    let host = Arc::new(MockHost::with_details(sample_details()));
    *host.annotations.lock().unwrap() = vec![failing_annotation()];
    // Capability responds but never with a usable fix
    let capability = Arc::new(MockCapability::returning(low_risk_result()));
    let state = test_state(TriggerMode::Hybrid, host.clone(), capability.clone()).await;
    state.store.register_companion(&companion()).await.unwrap();

    let run = attempt_auto_fix(&state, &companion(), &check_failure())
        .await
        .unwrap();

    assert_eq!(run.status, RemediationStatus::NeedsHuman);
    assert_eq!(run.attempts_used, 3);
    assert_eq!(capability.fix_count(), 3);
    assert_eq!(run.last_error(), Some("capability returned no usable fix"));

    // Three ordered failed tries, none with a payload
    assert_eq!(
        run.attempts.iter().map(|a| a.number).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(run.attempts.iter().all(|a| !a.succeeded && a.fix.is_none()));
    assert!(run.attempts.iter().all(|a| a.error.is_some()));

    let comments = host.comment_bodies();
    assert_eq!(comments.len(), 1);
    assert!(comments[0].contains("human attention"));

    let stored = state.store.remediation_state("comp-1").await.unwrap().unwrap();
    assert_eq!(stored, (3, "needs_human".to_string()));
}

#[tokio::test]
async fn test_transport_errors_still_consume_attempts() {
    let host = Arc::new(MockHost::with_details(sample_details()));
    *host.annotations.lock().unwrap() = vec![failing_annotation()];
    let capability = Arc::new(MockCapability::returning(low_risk_result()));
    capability.fail_fix.store(true, Ordering::SeqCst);
    let state = test_state(TriggerMode::Hybrid, host.clone(), capability.clone()).await;
    state.store.register_companion(&companion()).await.unwrap();

    let run = attempt_auto_fix(&state, &companion(), &check_failure())
        .await
        .unwrap();

    assert_eq!(run.status, RemediationStatus::NeedsHuman);
    assert_eq!(capability.fix_count(), 3);
    assert!(run
        .last_error()
        .unwrap()
        .contains("capability transport error"));
    // The escalation comment carries the last error for the human
    let comments = host.comment_bodies();
    assert!(comments[0].contains("capability transport error"));
}

#[tokio::test]
async fn test_attempt_budget_is_cumulative_across_events() {
    let host = Arc::new(MockHost::with_details(sample_details()));
    *host.annotations.lock().unwrap() = vec![failing_annotation()];
    let capability = Arc::new(MockCapability::returning(low_risk_result()));
    let state = test_state(TriggerMode::Hybrid, host.clone(), capability.clone()).await;
    state.store.register_companion(&companion()).await.unwrap();
    // Two attempts already spent by earlier check events
    state
        .store
        .record_remediation_attempt("comp-1", 2, "fixing")
        .await
        .unwrap();

    let run = attempt_auto_fix(&state, &companion(), &check_failure())
        .await
        .unwrap();

    // Only the one remaining attempt runs before escalation, numbered
    // where the budget left off
    assert_eq!(capability.fix_count(), 1);
    assert_eq!(run.status, RemediationStatus::NeedsHuman);
    assert_eq!(run.attempts_used, 3);
    assert_eq!(run.attempts.len(), 1);
    assert_eq!(run.attempts[0].number, 3);
}

#[tokio::test]
async fn test_terminal_state_short_circuits_new_failures() {
    let host = Arc::new(MockHost::with_details(sample_details()));
    *host.annotations.lock().unwrap() = vec![failing_annotation()];
    let capability = Arc::new(MockCapability::returning(low_risk_result()));
    let state = test_state(TriggerMode::Hybrid, host.clone(), capability.clone()).await;
    state.store.register_companion(&companion()).await.unwrap();
    state
        .store
        .record_remediation_attempt("comp-1", 3, "needs_human")
        .await
        .unwrap();

    let run = attempt_auto_fix(&state, &companion(), &check_failure())
        .await
        .unwrap();

    assert_eq!(run.status, RemediationStatus::NeedsHuman);
    assert_eq!(run.attempts_used, 3);
    // No new work: no tries, no capability calls, no commits, no comments
    assert!(run.attempts.is_empty());
    assert_eq!(capability.fix_count(), 0);
    assert!(host.commits.lock().unwrap().is_empty());
    assert!(host.comment_bodies().is_empty());
}

#[tokio::test]
async fn test_second_event_after_fixed_restarts_from_spent_budget() {
    let host = Arc::new(MockHost::with_details(sample_details()));
    *host.annotations.lock().unwrap() = vec![failing_annotation()];
    let capability = Arc::new(MockCapability::returning(low_risk_result()));
    *capability.fixes.lock().unwrap() = VecDeque::from([Some(usable_fix()), Some(usable_fix())]);
    let state = test_state(TriggerMode::Hybrid, host.clone(), capability.clone()).await;
    state.store.register_companion(&companion()).await.unwrap();

    let first = attempt_auto_fix(&state, &companion(), &check_failure())
        .await
        .unwrap();
    assert_eq!(first.status, RemediationStatus::Fixed);
    assert_eq!(first.attempts_used, 1);

    // The committed fix did not survive CI; the next failure event resumes
    let second = attempt_auto_fix(&state, &companion(), &check_failure())
        .await
        .unwrap();
    assert_eq!(second.status, RemediationStatus::Fixed);
    assert_eq!(second.attempts_used, 2);
    assert_eq!(capability.fix_count(), 2);
    assert_eq!(second.attempts.len(), 1);
    assert_eq!(second.attempts[0].number, 2);
    assert!(second.attempts[0].succeeded);

    let stored = state.store.remediation_state("comp-1").await.unwrap().unwrap();
    assert_eq!(stored, (2, "fixed".to_string()));
}
