// tests/pipeline_test.rs
// End-to-end orchestrator behavior against mocked host and capability

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{
    low_risk_result, sample_change, sample_details, test_state, FailingAnalyzers, MockCapability,
    MockHost,
};
use vigil::analysis;
use vigil::analysis::command::Command;
use vigil::analysis::trigger::TriggerMode;
use vigil::analysis::types::{AnalysisPhase, ChangeAction, MergeRecommendation, RiskLevel};
use vigil::llm::schema::TestFile;

#[tokio::test]
async fn test_auto_mode_reports_labels_and_persists() {
    let host = Arc::new(MockHost::with_details(sample_details()));
    let capability = Arc::new(MockCapability::returning(low_risk_result()));
    let state = test_state(TriggerMode::Auto, host.clone(), capability.clone()).await;

    let summary = sample_details().summary;
    let record = analysis::run_change_event(&state, &summary, ChangeAction::Opened)
        .await
        .unwrap()
        .expect("auto mode must produce a record");

    let comments = host.comment_bodies();
    assert_eq!(comments.len(), 1);
    assert!(comments[0].contains("## Vigil Risk Analysis"));

    let labels = host.labels.lock().unwrap().clone();
    assert_eq!(labels.len(), 1);
    assert!(labels[0].contains(&"vigil:risk:low".to_string()));
    assert!(labels[0].contains(&"vigil:healthy".to_string()));

    let stored = state
        .store
        .get_analysis(&record.id)
        .await
        .unwrap()
        .expect("record must be persisted");
    assert_eq!(stored.change, sample_change());
    assert_eq!(stored.result.risk_level, RiskLevel::Low);
}

#[tokio::test]
async fn test_uncovered_source_changes_surface_as_gaps() {
    // sample_details touches one source file and no tests
    let host = Arc::new(MockHost::with_details(sample_details()));
    let capability = Arc::new(MockCapability::returning(low_risk_result()));
    let state = test_state(TriggerMode::Auto, host.clone(), capability).await;

    let summary = sample_details().summary;
    let record = analysis::run_change_event(&state, &summary, ChangeAction::Opened)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(record.result.gaps.len(), 1);
    assert_eq!(record.result.gaps[0].severity, RiskLevel::High);
    let comments = host.comment_bodies();
    assert!(comments[0].contains("companion test updates"));
}

#[tokio::test]
async fn test_hybrid_mode_persists_without_commenting() {
    let host = Arc::new(MockHost::with_details(sample_details()));
    let capability = Arc::new(MockCapability::returning(low_risk_result()));
    let state = test_state(TriggerMode::Hybrid, host.clone(), capability.clone()).await;

    let summary = sample_details().summary;
    let record = analysis::run_change_event(&state, &summary, ChangeAction::Synchronize)
        .await
        .unwrap()
        .expect("hybrid mode still analyzes");

    assert!(host.comment_bodies().is_empty());
    assert!(host.labels.lock().unwrap().is_empty());
    assert!(state.store.get_analysis(&record.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_command_mode_takes_no_automatic_action() {
    let host = Arc::new(MockHost::with_details(sample_details()));
    let capability = Arc::new(MockCapability::returning(low_risk_result()));
    let state = test_state(TriggerMode::Command, host.clone(), capability.clone()).await;

    let summary = sample_details().summary;
    let outcome = analysis::run_change_event(&state, &summary, ChangeAction::Opened)
        .await
        .unwrap();

    assert!(outcome.is_none());
    assert_eq!(host.fetch_count(), 0);
    assert_eq!(*capability.analyze_calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_self_generated_changes_are_never_analyzed() {
    let host = Arc::new(MockHost::with_details(sample_details()));
    let capability = Arc::new(MockCapability::returning(low_risk_result()));
    let state = test_state(TriggerMode::Auto, host.clone(), capability.clone()).await;

    let mut by_title = sample_details().summary;
    by_title.title = "[Vigil] Automated tests for PR #41".to_string();
    assert!(analysis::run_change_event(&state, &by_title, ChangeAction::Opened)
        .await
        .unwrap()
        .is_none());

    let mut by_branch = sample_details().summary;
    by_branch.head_branch = "vigil/tests-pr-41".to_string();
    assert!(analysis::run_change_event(&state, &by_branch, ChangeAction::Opened)
        .await
        .unwrap()
        .is_none());

    // The guard fires before any host traffic
    assert_eq!(host.fetch_count(), 0);
    assert_eq!(*capability.analyze_calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_capability_failure_posts_error_comment_in_full_mode() {
    let host = Arc::new(MockHost::with_details(sample_details()));
    let capability = Arc::new(MockCapability::default()); // no result configured
    let state = test_state(TriggerMode::Auto, host.clone(), capability).await;

    let summary = sample_details().summary;
    let err = analysis::run_change_event(&state, &summary, ChangeAction::Opened)
        .await
        .unwrap_err();

    assert_eq!(err.phase(), AnalysisPhase::Analyzing);
    let comments = host.comment_bodies();
    assert_eq!(comments.len(), 1);
    assert!(comments[0].contains("could not be completed"));
}

#[tokio::test]
async fn test_fetch_failure_is_fatal_with_fetching_phase() {
    let host = Arc::new(MockHost::with_details(sample_details()));
    host.fail_fetch.store(true, Ordering::SeqCst);
    let capability = Arc::new(MockCapability::returning(low_risk_result()));
    let state = test_state(TriggerMode::Auto, host.clone(), capability).await;

    let summary = sample_details().summary;
    let err = analysis::run_change_event(&state, &summary, ChangeAction::Opened)
        .await
        .unwrap_err();

    assert_eq!(err.phase(), AnalysisPhase::Fetching);
}

#[tokio::test]
async fn test_comment_failure_is_fatal_in_full_mode() {
    let host = Arc::new(MockHost::with_details(sample_details()));
    host.fail_comment.store(true, Ordering::SeqCst);
    let capability = Arc::new(MockCapability::returning(low_risk_result()));
    let state = test_state(TriggerMode::Auto, host.clone(), capability).await;

    let summary = sample_details().summary;
    let err = analysis::run_change_event(&state, &summary, ChangeAction::Opened)
        .await
        .unwrap_err();

    assert_eq!(err.phase(), AnalysisPhase::Reporting);
}

#[tokio::test]
async fn test_label_failure_does_not_kill_the_run() {
    let host = Arc::new(MockHost::with_details(sample_details()));
    host.fail_labels.store(true, Ordering::SeqCst);
    let capability = Arc::new(MockCapability::returning(low_risk_result()));
    let state = test_state(TriggerMode::Auto, host.clone(), capability).await;

    let summary = sample_details().summary;
    let record = analysis::run_change_event(&state, &summary, ChangeAction::Opened)
        .await
        .unwrap();

    assert!(record.is_some());
    assert_eq!(host.comment_bodies().len(), 1);
}

#[tokio::test]
async fn test_failed_analyzers_degrade_without_killing_the_run() {
    let host = Arc::new(MockHost::with_details(sample_details()));
    let capability = Arc::new(MockCapability::returning(low_risk_result()));
    let mut state = test_state(TriggerMode::Auto, host.clone(), capability).await;
    state.analyzers = Arc::new(FailingAnalyzers);

    let summary = sample_details().summary;
    let record = analysis::run_change_event(&state, &summary, ChangeAction::Opened)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(record.skipped_analyzers, vec!["coverage", "dependencies"]);
    assert!(record.coverage.is_none());
    assert!(record.dependencies.is_none());
    // The primary verdict still reports
    assert_eq!(host.comment_bodies().len(), 1);
}

#[tokio::test]
async fn test_live_updates_narrate_the_run() {
    let host = Arc::new(MockHost::with_details(sample_details()));
    let capability = Arc::new(MockCapability::returning(low_risk_result()));
    let state = test_state(TriggerMode::Auto, host, capability).await;
    let mut updates = state.live.subscribe();

    let summary = sample_details().summary;
    analysis::run_change_event(&state, &summary, ChangeAction::Opened)
        .await
        .unwrap();

    let first = updates.try_recv().unwrap();
    assert_eq!(first.data_type, "analysis_started");
    let second = updates.try_recv().unwrap();
    assert_eq!(second.data_type, "analysis_completed");
}

// ============================================================================
// Command runs
// ============================================================================

#[tokio::test]
async fn test_analyze_command_reports_in_full_even_in_command_mode() {
    let host = Arc::new(MockHost::with_details(sample_details()));
    let capability = Arc::new(MockCapability::returning(low_risk_result()));
    let state = test_state(TriggerMode::Command, host.clone(), capability.clone()).await;

    analysis::run_command(
        &state,
        &sample_change(),
        sample_details().summary.credential,
        Command::Analyze,
    )
    .await
    .unwrap();

    let comments = host.comment_bodies();
    assert_eq!(comments.len(), 2, "acknowledgement plus report");
    assert!(comments[0].contains("analyzing"));
    assert!(comments[1].contains("## Vigil Risk Analysis"));
    assert_eq!(*capability.analyze_calls.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_help_command_answers_without_analyzing() {
    let host = Arc::new(MockHost::with_details(sample_details()));
    let capability = Arc::new(MockCapability::returning(low_risk_result()));
    let state = test_state(TriggerMode::Auto, host.clone(), capability.clone()).await;

    analysis::run_command(
        &state,
        &sample_change(),
        sample_details().summary.credential,
        Command::Help,
    )
    .await
    .unwrap();

    let comments = host.comment_bodies();
    assert_eq!(comments.len(), 1);
    assert!(comments[0].contains("/vigil analyze"));
    assert_eq!(*capability.analyze_calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_generate_tests_command_opens_companion() {
    let host = Arc::new(MockHost::with_details(sample_details()));
    let capability = Arc::new(MockCapability::returning(low_risk_result()));
    *capability.test_files.lock().unwrap() = vec![TestFile {
        path: "tests/rounding_test.rs".to_string(),
        content: "#[test]\nfn rounds_half_up() {}\n".to_string(),
    }];
    let state = test_state(TriggerMode::Hybrid, host.clone(), capability.clone()).await;

    analysis::run_command(
        &state,
        &sample_change(),
        sample_details().summary.credential,
        Command::GenerateTests,
    )
    .await
    .unwrap();

    assert_eq!(
        host.branches.lock().unwrap().clone(),
        vec!["vigil/tests-pr-42".to_string()]
    );
    let commits = host.commits.lock().unwrap().clone();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].0, "Add automated tests for PR #42");

    let opened = host.opened_prs.lock().unwrap().clone();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].0, "[Vigil] Automated tests for PR #42");
    assert_eq!(opened[0].1, "vigil/tests-pr-42");
    // Companion targets the source change's own branch
    assert_eq!(opened[0].2, "fix/rounding");

    let companion = state
        .store
        .companion_by_branch(&sample_change().repo, "vigil/tests-pr-42")
        .await
        .unwrap()
        .expect("companion must be registered");
    assert_eq!(companion.source_pr, 42);
    assert_eq!(companion.companion_pr, 901);

    // Acknowledgement and companion link; no full analysis report
    let comments = host.comment_bodies();
    assert_eq!(comments.len(), 2);
    assert!(comments[1].contains("#901"));
    assert!(!comments.iter().any(|c| c.contains("## Vigil Risk Analysis")));
}

#[tokio::test]
async fn test_commands_decline_on_generated_changes() {
    let mut details = sample_details();
    details.summary.title = "[Vigil] Automated tests for PR #42".to_string();
    details.summary.head_branch = "vigil/tests-pr-42".to_string();
    let host = Arc::new(MockHost::with_details(details));
    let capability = Arc::new(MockCapability::returning(low_risk_result()));
    let state = test_state(TriggerMode::Auto, host.clone(), capability.clone()).await;

    analysis::run_command(
        &state,
        &sample_change(),
        sample_details().summary.credential,
        Command::Analyze,
    )
    .await
    .unwrap();

    let comments = host.comment_bodies();
    assert_eq!(comments.len(), 1);
    assert!(comments[0].contains("not available"));
    assert_eq!(*capability.analyze_calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_block_verdicts_get_the_blocked_label() {
    // Block downgrades happen at the capability client boundary; once a
    // verdict enters the pipeline it is taken at face value.
    let mut result = low_risk_result();
    result.risk_level = RiskLevel::Critical;
    result.risk_score = 92;
    result.merge_recommendation = MergeRecommendation::Block;
    let host = Arc::new(MockHost::with_details(sample_details()));
    let capability = Arc::new(MockCapability::returning(result));
    let state = test_state(TriggerMode::Auto, host.clone(), capability).await;

    let summary = sample_details().summary;
    let record = analysis::run_change_event(&state, &summary, ChangeAction::Opened)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(record.result.merge_recommendation, MergeRecommendation::Block);
    let labels = host.labels.lock().unwrap().clone();
    assert!(labels[0].contains(&"vigil:blocked".to_string()));
}
