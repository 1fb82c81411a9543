// src/github/mod.rs
// The version-control collaborator: everything the pipeline asks of GitHub

pub mod events;

use crate::analysis::types::{
    ChangeRef, ChangeSummary, ChangedFile, CheckAnnotation, CredentialHandle, RepoRef,
};
use crate::config::VigilConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Full picture of a change after fetching
#[derive(Debug, Clone)]
pub struct ChangeDetails {
    pub summary: ChangeSummary,
    pub diff: String,
    pub files: Vec<ChangedFile>,
}

/// One file to write in a companion-change commit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitFile {
    pub path: String,
    pub content: String,
}

/// Host operations the pipeline depends on. The REST client below is the
/// production implementation; tests substitute their own.
#[async_trait]
pub trait ChangeHost: Send + Sync {
    async fn fetch_change_details(
        &self,
        change: &ChangeRef,
        credential: CredentialHandle,
    ) -> Result<ChangeDetails>;

    async fn post_comment(
        &self,
        change: &ChangeRef,
        credential: CredentialHandle,
        body: &str,
    ) -> Result<()>;

    /// Replace any stale `vigil:` labels with the given set
    async fn apply_risk_labels(
        &self,
        change: &ChangeRef,
        credential: CredentialHandle,
        labels: &[String],
    ) -> Result<()>;

    async fn list_check_annotations(
        &self,
        repo: &RepoRef,
        credential: CredentialHandle,
        check_run_id: i64,
    ) -> Result<Vec<CheckAnnotation>>;

    async fn fetch_check_output(
        &self,
        repo: &RepoRef,
        credential: CredentialHandle,
        check_run_id: i64,
    ) -> Result<Option<String>>;

    async fn fetch_job_log(
        &self,
        repo: &RepoRef,
        credential: CredentialHandle,
        check_run_id: i64,
    ) -> Result<Option<String>>;

    async fn create_branch(
        &self,
        repo: &RepoRef,
        credential: CredentialHandle,
        branch: &str,
        from_sha: &str,
    ) -> Result<()>;

    /// Commit the files to the branch in one commit; returns the commit sha
    async fn commit_files(
        &self,
        repo: &RepoRef,
        credential: CredentialHandle,
        branch: &str,
        message: &str,
        files: &[CommitFile],
    ) -> Result<String>;

    /// Returns the new pull request's number
    async fn open_pull_request(
        &self,
        repo: &RepoRef,
        credential: CredentialHandle,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<i64>;
}

// ============================================================================
// REST implementation
// ============================================================================

const JSON_ACCEPT: &str = "application/vnd.github+json";
const DIFF_ACCEPT: &str = "application/vnd.github.v3.diff";

pub struct GitHubClient {
    http: Client,
    base_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(config: &VigilConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.github_timeout))
            .user_agent("vigil-risk-analysis")
            .build()
            .context("Failed to build GitHub HTTP client")?;

        Ok(Self {
            http,
            base_url: config.github_base_url.trim_end_matches('/').to_string(),
            token: config.github_token.clone(),
        })
    }

    /// Single-tenant deployment: one configured token covers every
    /// installation handle the host sends us.
    fn request(&self, method: Method, path: &str, credential: CredentialHandle) -> RequestBuilder {
        self.request_accept(method, path, JSON_ACCEPT, credential)
    }

    fn request_accept(
        &self,
        method: Method,
        path: &str,
        accept: &str,
        credential: CredentialHandle,
    ) -> RequestBuilder {
        debug!(%path, credential = %credential, "GitHub request");
        self.http
            .request(
                method,
                format!("{}/{}", self.base_url, path.trim_start_matches('/')),
            )
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", accept)
    }
}

async fn send_checked(builder: RequestBuilder, what: &str) -> Result<reqwest::Response> {
    let response = builder
        .send()
        .await
        .with_context(|| format!("Failed to send {what} request"))?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(anyhow::anyhow!(
            "GitHub API error {} for {}: {}",
            status,
            what,
            error_text
        ));
    }
    Ok(response)
}

// --- Wire shapes (responses only; requests are built with json!) ---

#[derive(Debug, Deserialize)]
struct PullResponse {
    title: String,
    body: Option<String>,
    #[serde(default)]
    draft: bool,
    user: events::UserPayload,
    head: events::BranchPayload,
    base: events::BranchPayload,
}

#[derive(Debug, Deserialize)]
struct FileResponse {
    filename: String,
    status: String,
    additions: i64,
    deletions: i64,
    patch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LabelResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AnnotationResponse {
    path: String,
    start_line: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct CheckRunResponse {
    output: Option<CheckOutputResponse>,
}

#[derive(Debug, Deserialize)]
struct CheckOutputResponse {
    summary: Option<String>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: ShaResponse,
}

#[derive(Debug, Deserialize)]
struct GitCommitResponse {
    tree: ShaResponse,
}

#[derive(Debug, Deserialize)]
struct ShaResponse {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct PullCreatedResponse {
    number: i64,
}

fn stale_vigil_labels<'a>(current: &'a [LabelResponse], next: &[String]) -> Vec<&'a str> {
    current
        .iter()
        .filter(|label| label.name.starts_with("vigil:") && !next.iter().any(|n| n == &label.name))
        .map(|label| label.name.as_str())
        .collect()
}

fn combine_check_output(output: Option<CheckOutputResponse>) -> Option<String> {
    let output = output?;
    let summary = output.summary.filter(|s| !s.trim().is_empty());
    let text = output.text.filter(|t| !t.trim().is_empty());
    match (summary, text) {
        (Some(s), Some(t)) => Some(format!("{s}\n\n{t}")),
        (Some(s), None) => Some(s),
        (None, Some(t)) => Some(t),
        (None, None) => None,
    }
}

#[async_trait]
impl ChangeHost for GitHubClient {
    async fn fetch_change_details(
        &self,
        change: &ChangeRef,
        credential: CredentialHandle,
    ) -> Result<ChangeDetails> {
        let base = format!(
            "repos/{}/{}/pulls/{}",
            change.repo.owner, change.repo.name, change.number
        );

        let pull: PullResponse =
            send_checked(self.request(Method::GET, &base, credential), "pull request")
                .await?
                .json()
                .await
                .context("Failed to parse pull request response")?;

        let diff = send_checked(
            self.request_accept(Method::GET, &base, DIFF_ACCEPT, credential),
            "pull request diff",
        )
        .await?
        .text()
        .await
        .context("Failed to read pull request diff")?;

        let files: Vec<FileResponse> = send_checked(
            self.request(Method::GET, &format!("{base}/files?per_page=100"), credential),
            "changed files",
        )
        .await?
        .json()
        .await
        .context("Failed to parse changed files response")?;

        Ok(ChangeDetails {
            summary: ChangeSummary {
                change: change.clone(),
                title: pull.title,
                body: pull.body.unwrap_or_default(),
                author: pull.user.login,
                head_sha: pull.head.sha,
                head_branch: pull.head.branch,
                base_branch: pull.base.branch,
                draft: pull.draft,
                credential,
            },
            diff,
            files: files
                .into_iter()
                .map(|f| ChangedFile {
                    path: f.filename,
                    status: f.status,
                    additions: f.additions,
                    deletions: f.deletions,
                    patch: f.patch,
                })
                .collect(),
        })
    }

    async fn post_comment(
        &self,
        change: &ChangeRef,
        credential: CredentialHandle,
        body: &str,
    ) -> Result<()> {
        let path = format!(
            "repos/{}/{}/issues/{}/comments",
            change.repo.owner, change.repo.name, change.number
        );
        send_checked(
            self.request(Method::POST, &path, credential)
                .json(&json!({ "body": body })),
            "comment",
        )
        .await?;
        Ok(())
    }

    async fn apply_risk_labels(
        &self,
        change: &ChangeRef,
        credential: CredentialHandle,
        labels: &[String],
    ) -> Result<()> {
        let issue = format!(
            "repos/{}/{}/issues/{}",
            change.repo.owner, change.repo.name, change.number
        );

        let current: Vec<LabelResponse> = send_checked(
            self.request(
                Method::GET,
                &format!("{issue}/labels?per_page=100"),
                credential,
            ),
            "labels",
        )
        .await?
        .json()
        .await
        .context("Failed to parse labels response")?;

        for stale in stale_vigil_labels(&current, labels) {
            let encoded = urlencoding::encode(stale);
            send_checked(
                self.request(
                    Method::DELETE,
                    &format!("{issue}/labels/{encoded}"),
                    credential,
                ),
                "label removal",
            )
            .await?;
        }

        send_checked(
            self.request(Method::POST, &format!("{issue}/labels"), credential)
                .json(&json!({ "labels": labels })),
            "label update",
        )
        .await?;
        Ok(())
    }

    async fn list_check_annotations(
        &self,
        repo: &RepoRef,
        credential: CredentialHandle,
        check_run_id: i64,
    ) -> Result<Vec<CheckAnnotation>> {
        let path = format!(
            "repos/{}/{}/check-runs/{}/annotations?per_page=100",
            repo.owner, repo.name, check_run_id
        );
        let annotations: Vec<AnnotationResponse> =
            send_checked(self.request(Method::GET, &path, credential), "annotations")
                .await?
                .json()
                .await
                .context("Failed to parse annotations response")?;

        Ok(annotations
            .into_iter()
            .map(|a| CheckAnnotation {
                path: a.path,
                start_line: a.start_line,
                message: a.message,
            })
            .collect())
    }

    async fn fetch_check_output(
        &self,
        repo: &RepoRef,
        credential: CredentialHandle,
        check_run_id: i64,
    ) -> Result<Option<String>> {
        let path = format!(
            "repos/{}/{}/check-runs/{}",
            repo.owner, repo.name, check_run_id
        );
        let run: CheckRunResponse =
            send_checked(self.request(Method::GET, &path, credential), "check run")
                .await?
                .json()
                .await
                .context("Failed to parse check run response")?;

        Ok(combine_check_output(run.output))
    }

    async fn fetch_job_log(
        &self,
        repo: &RepoRef,
        credential: CredentialHandle,
        check_run_id: i64,
    ) -> Result<Option<String>> {
        // Check-run ids double as Actions job ids; non-Actions checks 404 here
        let path = format!(
            "repos/{}/{}/actions/jobs/{}/logs",
            repo.owner, repo.name, check_run_id
        );
        let response = self
            .request(Method::GET, &path, credential)
            .send()
            .await
            .context("Failed to send job log request")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(
                "GitHub API error {} for job log: {}",
                status,
                error_text
            ));
        }

        let log = response
            .text()
            .await
            .context("Failed to read job log body")?;
        Ok(if log.trim().is_empty() { None } else { Some(log) })
    }

    async fn create_branch(
        &self,
        repo: &RepoRef,
        credential: CredentialHandle,
        branch: &str,
        from_sha: &str,
    ) -> Result<()> {
        let path = format!("repos/{}/{}/git/refs", repo.owner, repo.name);
        send_checked(
            self.request(Method::POST, &path, credential).json(&json!({
                "ref": format!("refs/heads/{branch}"),
                "sha": from_sha,
            })),
            "branch creation",
        )
        .await?;
        Ok(())
    }

    async fn commit_files(
        &self,
        repo: &RepoRef,
        credential: CredentialHandle,
        branch: &str,
        message: &str,
        files: &[CommitFile],
    ) -> Result<String> {
        let repo_path = format!("repos/{}/{}", repo.owner, repo.name);

        let head: RefResponse = send_checked(
            self.request(
                Method::GET,
                &format!("{repo_path}/git/ref/heads/{branch}"),
                credential,
            ),
            "branch head",
        )
        .await?
        .json()
        .await
        .context("Failed to parse branch head response")?;
        let parent_sha = head.object.sha;

        let parent: GitCommitResponse = send_checked(
            self.request(
                Method::GET,
                &format!("{repo_path}/git/commits/{parent_sha}"),
                credential,
            ),
            "parent commit",
        )
        .await?
        .json()
        .await
        .context("Failed to parse parent commit response")?;

        // Upload each file as a utf-8 blob, then build one tree and commit
        let mut tree_entries = Vec::with_capacity(files.len());
        for file in files {
            let blob: ShaResponse = send_checked(
                self.request(Method::POST, &format!("{repo_path}/git/blobs"), credential)
                    .json(&json!({ "content": file.content, "encoding": "utf-8" })),
                "blob upload",
            )
            .await?
            .json()
            .await
            .context("Failed to parse blob response")?;

            tree_entries.push(json!({
                "path": file.path,
                "mode": "100644",
                "type": "blob",
                "sha": blob.sha,
            }));
        }

        let tree: ShaResponse = send_checked(
            self.request(Method::POST, &format!("{repo_path}/git/trees"), credential)
                .json(&json!({ "base_tree": parent.tree.sha, "tree": tree_entries })),
            "tree creation",
        )
        .await?
        .json()
        .await
        .context("Failed to parse tree response")?;

        let commit: ShaResponse = send_checked(
            self.request(Method::POST, &format!("{repo_path}/git/commits"), credential)
                .json(&json!({
                    "message": message,
                    "tree": tree.sha,
                    "parents": [parent_sha],
                })),
            "commit creation",
        )
        .await?
        .json()
        .await
        .context("Failed to parse commit response")?;

        send_checked(
            self.request(
                Method::PATCH,
                &format!("{repo_path}/git/refs/heads/{branch}"),
                credential,
            )
            .json(&json!({ "sha": commit.sha })),
            "branch update",
        )
        .await?;

        Ok(commit.sha)
    }

    async fn open_pull_request(
        &self,
        repo: &RepoRef,
        credential: CredentialHandle,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<i64> {
        let path = format!("repos/{}/{}/pulls", repo.owner, repo.name);
        let created: PullCreatedResponse = send_checked(
            self.request(Method::POST, &path, credential).json(&json!({
                "title": title,
                "body": body,
                "head": head,
                "base": base,
            })),
            "pull request creation",
        )
        .await?
        .json()
        .await
        .context("Failed to parse created pull request response")?;

        Ok(created.number)
    }
}
