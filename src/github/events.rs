// src/github/events.rs
// Typed webhook payloads. Only the fields the pipeline reads are modeled;
// the rest of the delivery is ignored at deserialization.

use crate::analysis::types::{ChangeRef, ChangeSummary, CheckFailure, CredentialHandle, RepoRef};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestEvent {
    pub action: String,
    pub pull_request: Option<PullRequestPayload>,
    pub repository: Option<RepositoryPayload>,
    pub installation: Option<InstallationPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestPayload {
    pub number: i64,
    pub title: String,
    pub body: Option<String>,
    pub user: UserPayload,
    #[serde(default)]
    pub draft: bool,
    pub head: BranchPayload,
    pub base: BranchPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserPayload {
    pub login: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl UserPayload {
    /// Automation accounts must never trigger analysis or command handling
    pub fn is_bot(&self) -> bool {
        self.kind.as_deref() == Some("Bot") || self.login.ends_with("[bot]")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryPayload {
    pub name: String,
    pub owner: OwnerPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OwnerPayload {
    pub login: String,
}

impl RepositoryPayload {
    pub fn repo_ref(&self) -> RepoRef {
        RepoRef::new(self.owner.login.clone(), self.name.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstallationPayload {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BranchPayload {
    #[serde(rename = "ref")]
    pub branch: String,
    pub sha: String,
}

impl PullRequestEvent {
    /// None when the delivery is missing the identifiers we need (400 at
    /// the handler, per the fatal-at-ingestion policy).
    pub fn change_summary(&self) -> Option<ChangeSummary> {
        let pr = self.pull_request.as_ref()?;
        let repo = self.repository.as_ref()?;
        Some(ChangeSummary {
            change: ChangeRef {
                repo: repo.repo_ref(),
                number: pr.number,
            },
            title: pr.title.clone(),
            body: pr.body.clone().unwrap_or_default(),
            author: pr.user.login.clone(),
            head_sha: pr.head.sha.clone(),
            head_branch: pr.head.branch.clone(),
            base_branch: pr.base.branch.clone(),
            draft: pr.draft,
            credential: self.credential(),
        })
    }

    fn credential(&self) -> CredentialHandle {
        CredentialHandle(self.installation.as_ref().map(|i| i.id).unwrap_or(0))
    }
}

// ============================================================================
// Issue comments (command channel)
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct IssueCommentEvent {
    pub action: String,
    pub comment: Option<CommentPayload>,
    pub issue: Option<IssuePayload>,
    pub repository: Option<RepositoryPayload>,
    pub installation: Option<InstallationPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentPayload {
    pub body: String,
    pub user: UserPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssuePayload {
    pub number: i64,
    /// Present only when the issue is a pull request
    pub pull_request: Option<serde_json::Value>,
}

impl IssueCommentEvent {
    /// The comment and change it refers to, if this event is a fresh
    /// human comment on a pull request. Bot comments and plain-issue
    /// comments are filtered here, before command parsing.
    pub fn pull_request_comment(&self) -> Option<(ChangeRef, &str)> {
        if self.action != "created" {
            return None;
        }
        let comment = self.comment.as_ref()?;
        if comment.user.is_bot() {
            return None;
        }
        let issue = self.issue.as_ref()?;
        issue.pull_request.as_ref()?;
        let repo = self.repository.as_ref()?;
        Some((
            ChangeRef {
                repo: repo.repo_ref(),
                number: issue.number,
            },
            comment.body.as_str(),
        ))
    }

    pub fn credential(&self) -> CredentialHandle {
        CredentialHandle(self.installation.as_ref().map(|i| i.id).unwrap_or(0))
    }
}

// ============================================================================
// Check runs (remediation channel)
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CheckRunEvent {
    pub action: String,
    pub check_run: Option<CheckRunPayload>,
    pub repository: Option<RepositoryPayload>,
    pub installation: Option<InstallationPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckRunPayload {
    pub id: i64,
    pub name: String,
    pub conclusion: Option<String>,
    pub head_sha: String,
    pub check_suite: Option<CheckSuitePayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckSuitePayload {
    pub head_branch: Option<String>,
}

impl CheckRunEvent {
    /// Some(failure) when a completed check run concluded in failure;
    /// None for in-progress runs and other conclusions.
    pub fn failure(&self) -> Option<CheckFailure> {
        if self.action != "completed" {
            return None;
        }
        let run = self.check_run.as_ref()?;
        if run.conclusion.as_deref() != Some("failure") {
            return None;
        }
        let repo = self.repository.as_ref()?;
        Some(CheckFailure {
            repo: repo.repo_ref(),
            check_run_id: run.id,
            check_name: run.name.clone(),
            head_sha: run.head_sha.clone(),
            head_branch: run
                .check_suite
                .as_ref()
                .and_then(|s| s.head_branch.clone())
                .unwrap_or_default(),
            credential: CredentialHandle(
                self.installation.as_ref().map(|i| i.id).unwrap_or(0),
            ),
        })
    }

    pub fn succeeded(&self) -> bool {
        self.action == "completed"
            && self
                .check_run
                .as_ref()
                .and_then(|r| r.conclusion.as_deref())
                == Some("success")
    }

    pub fn head_branch(&self) -> Option<&str> {
        self.check_run
            .as_ref()?
            .check_suite
            .as_ref()?
            .head_branch
            .as_deref()
    }
}
