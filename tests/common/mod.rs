// tests/common/mod.rs
// Shared mocks and state assembly for integration tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;

use vigil::analysis::error::AnalysisError;
use vigil::analysis::trigger::TriggerMode;
use vigil::analysis::types::{
    AnalysisRequest, AnalysisResult, ChangeRef, ChangeSummary, ChangedFile, CheckAnnotation,
    CredentialHandle, MergeRecommendation, RepoRef, RiskLevel, TestScenario,
};
use vigil::analysis::AuxAnalyzers;
use vigil::config::VigilConfig;
use vigil::github::{ChangeDetails, ChangeHost, CommitFile};
use vigil::llm::schema::{FixPayload, TestFile};
use vigil::llm::AnalysisCapability;
use vigil::notify::live::LiveUpdateHub;
use vigil::notify::ChatNotifier;
use vigil::state::AppState;
use vigil::store::VigilStore;

pub fn test_config(trigger_mode: TriggerMode) -> VigilConfig {
    VigilConfig {
        trigger_mode,
        max_fix_attempts: 3,
        trust_capability_block: false,
        capability_base_url: "https://api.openai.com".to_string(),
        capability_api_key: "test-key".to_string(),
        capability_model: "gpt-5".to_string(),
        capability_timeout: 120,
        capability_max_output_tokens: 8192,
        github_base_url: "https://api.github.com".to_string(),
        github_token: "ghs_test".to_string(),
        github_timeout: 30,
        database_url: "sqlite::memory:".to_string(),
        sqlite_max_connections: 1,
        chat_webhook_url: String::new(),
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origin: "*".to_string(),
        log_level: "debug".to_string(),
    }
}

pub async fn memory_store() -> VigilStore {
    // One connection so every query sees the same in-memory database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let store = VigilStore::new(pool);
    store.run_migrations().await.unwrap();
    store
}

pub async fn test_state(
    trigger_mode: TriggerMode,
    host: Arc<MockHost>,
    capability: Arc<MockCapability>,
) -> AppState {
    let config = test_config(trigger_mode);
    AppState {
        chat: ChatNotifier::new(&config),
        config,
        store: memory_store().await,
        host,
        capability,
        analyzers: Arc::new(vigil::analysis::HeuristicAnalyzers),
        live: LiveUpdateHub::new(),
    }
}

pub fn sample_change() -> ChangeRef {
    ChangeRef {
        repo: RepoRef::new("acme", "billing"),
        number: 42,
    }
}

pub fn sample_summary() -> ChangeSummary {
    ChangeSummary {
        change: sample_change(),
        title: "Add invoice rounding".to_string(),
        body: "Rounds totals to the nearest cent.".to_string(),
        author: "dev-a".to_string(),
        head_sha: "abc123".to_string(),
        head_branch: "fix/rounding".to_string(),
        base_branch: "main".to_string(),
        draft: false,
        credential: CredentialHandle(7),
    }
}

pub fn sample_details() -> ChangeDetails {
    ChangeDetails {
        summary: sample_summary(),
        diff: "diff --git a/src/invoice.rs b/src/invoice.rs\n+fn round() {}\n".to_string(),
        files: vec![ChangedFile {
            path: "src/invoice.rs".to_string(),
            status: "modified".to_string(),
            additions: 12,
            deletions: 3,
            patch: Some("+fn round() {}".to_string()),
        }],
    }
}

pub fn low_risk_result() -> AnalysisResult {
    AnalysisResult {
        risk_level: RiskLevel::Low,
        risk_score: 15,
        merge_recommendation: MergeRecommendation::MergeOk,
        summary: "Small, well-contained change.".to_string(),
        findings: vec![],
        gaps: vec![],
        scenarios: vec![TestScenario {
            name: "rounds_half_up".to_string(),
            description: "totals ending in .005 round to the next cent".to_string(),
        }],
    }
}

// ============================================================================
// Mock change host
// ============================================================================

#[derive(Default)]
pub struct MockHost {
    pub details: Mutex<Option<ChangeDetails>>,
    pub fail_fetch: AtomicBool,
    pub fail_comment: AtomicBool,
    pub fail_labels: AtomicBool,
    pub annotations: Mutex<Vec<CheckAnnotation>>,

    pub fetch_calls: Mutex<usize>,
    pub comments: Mutex<Vec<String>>,
    pub labels: Mutex<Vec<Vec<String>>>,
    pub branches: Mutex<Vec<String>>,
    pub commits: Mutex<Vec<(String, Vec<CommitFile>)>>,
    pub opened_prs: Mutex<Vec<(String, String, String)>>,
}

impl MockHost {
    pub fn with_details(details: ChangeDetails) -> Self {
        let host = Self::default();
        *host.details.lock().unwrap() = Some(details);
        host
    }

    pub fn comment_bodies(&self) -> Vec<String> {
        self.comments.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        *self.fetch_calls.lock().unwrap()
    }
}

#[async_trait]
impl ChangeHost for MockHost {
    async fn fetch_change_details(
        &self,
        _change: &ChangeRef,
        _credential: CredentialHandle,
    ) -> Result<ChangeDetails> {
        *self.fetch_calls.lock().unwrap() += 1;
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(anyhow!("host refused the fetch"));
        }
        self.details
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow!("no details configured"))
    }

    async fn post_comment(
        &self,
        _change: &ChangeRef,
        _credential: CredentialHandle,
        body: &str,
    ) -> Result<()> {
        if self.fail_comment.load(Ordering::SeqCst) {
            return Err(anyhow!("comment rejected"));
        }
        self.comments.lock().unwrap().push(body.to_string());
        Ok(())
    }

    async fn apply_risk_labels(
        &self,
        _change: &ChangeRef,
        _credential: CredentialHandle,
        labels: &[String],
    ) -> Result<()> {
        if self.fail_labels.load(Ordering::SeqCst) {
            return Err(anyhow!("labels rejected"));
        }
        self.labels.lock().unwrap().push(labels.to_vec());
        Ok(())
    }

    async fn list_check_annotations(
        &self,
        _repo: &RepoRef,
        _credential: CredentialHandle,
        _check_run_id: i64,
    ) -> Result<Vec<CheckAnnotation>> {
        Ok(self.annotations.lock().unwrap().clone())
    }

    async fn fetch_check_output(
        &self,
        _repo: &RepoRef,
        _credential: CredentialHandle,
        _check_run_id: i64,
    ) -> Result<Option<String>> {
        Ok(None)
    }

    async fn fetch_job_log(
        &self,
        _repo: &RepoRef,
        _credential: CredentialHandle,
        _check_run_id: i64,
    ) -> Result<Option<String>> {
        Ok(None)
    }

    async fn create_branch(
        &self,
        _repo: &RepoRef,
        _credential: CredentialHandle,
        branch: &str,
        _from_sha: &str,
    ) -> Result<()> {
        self.branches.lock().unwrap().push(branch.to_string());
        Ok(())
    }

    async fn commit_files(
        &self,
        _repo: &RepoRef,
        _credential: CredentialHandle,
        _branch: &str,
        message: &str,
        files: &[CommitFile],
    ) -> Result<String> {
        self.commits
            .lock()
            .unwrap()
            .push((message.to_string(), files.to_vec()));
        Ok(format!("sha-{}", self.commits.lock().unwrap().len()))
    }

    async fn open_pull_request(
        &self,
        _repo: &RepoRef,
        _credential: CredentialHandle,
        title: &str,
        _body: &str,
        head: &str,
        base: &str,
    ) -> Result<i64> {
        let mut opened = self.opened_prs.lock().unwrap();
        opened.push((title.to_string(), head.to_string(), base.to_string()));
        Ok(900 + opened.len() as i64)
    }
}

// ============================================================================
// Mock analysis capability
// ============================================================================

#[derive(Default)]
pub struct MockCapability {
    pub result: Mutex<Option<AnalysisResult>>,
    /// Popped front-first, one per request_fix call; empty queue yields None
    pub fixes: Mutex<VecDeque<Option<FixPayload>>>,
    pub fail_fix: AtomicBool,
    pub test_files: Mutex<Vec<TestFile>>,

    pub analyze_calls: Mutex<usize>,
    pub fix_calls: Mutex<usize>,
    pub testgen_calls: Mutex<usize>,
}

impl MockCapability {
    pub fn returning(result: AnalysisResult) -> Self {
        let capability = Self::default();
        *capability.result.lock().unwrap() = Some(result);
        capability
    }

    pub fn fix_count(&self) -> usize {
        *self.fix_calls.lock().unwrap()
    }
}

#[async_trait]
impl AnalysisCapability for MockCapability {
    async fn analyze(
        &self,
        _request: &AnalysisRequest,
        _hints: &[String],
    ) -> Result<AnalysisResult, AnalysisError> {
        *self.analyze_calls.lock().unwrap() += 1;
        self.result
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AnalysisError::Capability(anyhow!("capability offline")))
    }

    async fn request_fix(
        &self,
        _diagnostics: &str,
        _artifacts: &[CommitFile],
    ) -> Result<Option<FixPayload>> {
        *self.fix_calls.lock().unwrap() += 1;
        if self.fail_fix.load(Ordering::SeqCst) {
            return Err(anyhow!("capability transport error"));
        }
        Ok(self.fixes.lock().unwrap().pop_front().flatten())
    }

    async fn generate_tests(
        &self,
        _request: &AnalysisRequest,
        _scenarios: &[TestScenario],
    ) -> Result<Vec<TestFile>> {
        *self.testgen_calls.lock().unwrap() += 1;
        Ok(self.test_files.lock().unwrap().clone())
    }
}

// ============================================================================
// Failing auxiliary analyzers
// ============================================================================

pub struct FailingAnalyzers;

#[async_trait]
impl AuxAnalyzers for FailingAnalyzers {
    async fn coverage(
        &self,
        _files: &[ChangedFile],
    ) -> Result<Option<vigil::analysis::types::CoverageSignal>> {
        Err(anyhow!("coverage analyzer offline"))
    }

    async fn dependencies(
        &self,
        _files: &[ChangedFile],
        _diff: &str,
    ) -> Result<vigil::analysis::types::DependencyAudit> {
        Err(anyhow!("dependency analyzer offline"))
    }
}
