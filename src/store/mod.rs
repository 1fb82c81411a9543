// src/store/mod.rs
// SQLite persistence: analysis records, companion changes, remediation state

use crate::analysis::types::{AnalysisRecord, ChangeAction, ChangeRef, RepoRef};
use crate::github::CommitFile;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

/// Initial schema. Idempotent; safe to run at every startup.
const CREATE_ANALYSES: &str = r#"
CREATE TABLE IF NOT EXISTS analyses (
    id TEXT PRIMARY KEY,
    repo_owner TEXT NOT NULL,
    repo_name TEXT NOT NULL,
    pr_number INTEGER NOT NULL,
    action TEXT NOT NULL,
    risk_level TEXT NOT NULL,
    risk_score INTEGER NOT NULL,
    merge_recommendation TEXT NOT NULL,
    health_score INTEGER NOT NULL,
    health_status TEXT NOT NULL,
    health_trend TEXT NOT NULL,
    result_json TEXT NOT NULL,
    health_json TEXT NOT NULL,
    coverage_json TEXT,
    dependencies_json TEXT,
    skipped_json TEXT NOT NULL DEFAULT '[]',
    diff_digest TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

const CREATE_COMPANIONS: &str = r#"
CREATE TABLE IF NOT EXISTS companion_changes (
    id TEXT PRIMARY KEY,
    repo_owner TEXT NOT NULL,
    repo_name TEXT NOT NULL,
    source_pr INTEGER NOT NULL,
    companion_pr INTEGER NOT NULL,
    branch TEXT NOT NULL,
    artifacts_json TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

const CREATE_REMEDIATION_STATE: &str = r#"
CREATE TABLE IF NOT EXISTS remediation_state (
    companion_id TEXT PRIMARY KEY,
    attempts INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'pending',
    updated_at TEXT NOT NULL
);
"#;

const CREATE_INDICES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_analyses_change ON analyses(repo_owner, repo_name, pr_number);
CREATE INDEX IF NOT EXISTS idx_analyses_created_at ON analyses(created_at);
CREATE UNIQUE INDEX IF NOT EXISTS idx_companions_branch ON companion_changes(repo_owner, repo_name, branch);
"#;

/// A generated-tests PR tracked alongside its source change. The branch is
/// how check_run failures are routed back to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanionChange {
    pub id: String,
    pub repo: RepoRef,
    pub source_pr: i64,
    pub companion_pr: i64,
    pub branch: String,
    pub artifacts: Vec<CommitFile>,
    pub created_at: DateTime<Utc>,
}

impl CompanionChange {
    /// The companion PR as a change reference
    pub fn change(&self) -> ChangeRef {
        ChangeRef {
            repo: self.repo.clone(),
            number: self.companion_pr,
        }
    }

    /// The source PR the companion was generated for
    pub fn source_change(&self) -> ChangeRef {
        ChangeRef {
            repo: self.repo.clone(),
            number: self.source_pr,
        }
    }
}

/// Read shape for the analyses table; JSON columns are decoded on the way out
#[derive(sqlx::FromRow)]
struct AnalysisRow {
    id: String,
    repo_owner: String,
    repo_name: String,
    pr_number: i64,
    action: String,
    result_json: String,
    health_json: String,
    coverage_json: Option<String>,
    dependencies_json: Option<String>,
    skipped_json: String,
    diff_digest: String,
    created_at: String,
}

impl AnalysisRow {
    fn into_record(self) -> Result<AnalysisRecord> {
        Ok(AnalysisRecord {
            id: self.id,
            change: ChangeRef {
                repo: RepoRef::new(self.repo_owner, self.repo_name),
                number: self.pr_number,
            },
            action: self.action.parse().unwrap_or(ChangeAction::Opened),
            result: serde_json::from_str(&self.result_json)
                .context("Corrupt result_json column")?,
            health: serde_json::from_str(&self.health_json)
                .context("Corrupt health_json column")?,
            coverage: self
                .coverage_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .context("Corrupt coverage_json column")?,
            dependencies: self
                .dependencies_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .context("Corrupt dependencies_json column")?,
            skipped_analyzers: serde_json::from_str(&self.skipped_json)
                .context("Corrupt skipped_json column")?,
            diff_digest: self.diff_digest,
            created_at: DateTime::parse_from_rfc3339(&self.created_at)
                .context("Corrupt created_at column")?
                .with_timezone(&Utc),
        })
    }
}

#[derive(Clone)]
pub struct VigilStore {
    pub pool: SqlitePool,
}

impl VigilStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create an optimized SQLite connection pool
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {database_url}"))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            // SQLite is single-writer, but can have multiple readers
            .max_connections(max_connections)
            // Keep some connections ready
            .min_connections(2)
            // Don't wait too long for a connection
            .acquire_timeout(Duration::from_secs(10))
            // Recycle connections periodically
            .max_lifetime(Duration::from_secs(1800))
            .connect_with(options)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

        Ok(Self::new(pool))
    }

    /// Runs all required migrations. Safe to call at every startup.
    pub async fn run_migrations(&self) -> Result<()> {
        for statement in [
            CREATE_ANALYSES,
            CREATE_COMPANIONS,
            CREATE_REMEDIATION_STATE,
            CREATE_INDICES,
        ] {
            sqlx::raw_sql(statement)
                .execute(&self.pool)
                .await
                .context("Migration failed")?;
        }
        Ok(())
    }

    // ========================================================================
    // Analyses
    // ========================================================================

    pub async fn save_analysis(&self, record: &AnalysisRecord) -> Result<()> {
        let result_json = serde_json::to_string(&record.result)?;
        let health_json = serde_json::to_string(&record.health)?;
        let coverage_json = record
            .coverage
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let dependencies_json = record
            .dependencies
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let skipped_json = serde_json::to_string(&record.skipped_analyzers)?;

        sqlx::query(
            r#"
            INSERT INTO analyses
                (id, repo_owner, repo_name, pr_number, action,
                 risk_level, risk_score, merge_recommendation,
                 health_score, health_status, health_trend,
                 result_json, health_json, coverage_json, dependencies_json,
                 skipped_json, diff_digest, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(&record.id)
        .bind(&record.change.repo.owner)
        .bind(&record.change.repo.name)
        .bind(record.change.number)
        .bind(record.action.as_str())
        .bind(record.result.risk_level.as_str())
        .bind(record.result.risk_score as i64)
        .bind(record.result.merge_recommendation.as_str())
        .bind(record.health.score as i64)
        .bind(record.health.status.as_str())
        .bind(record.health.trend.as_str())
        .bind(&result_json)
        .bind(&health_json)
        .bind(coverage_json)
        .bind(dependencies_json)
        .bind(&skipped_json)
        .bind(&record.diff_digest)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save analysis record")?;

        Ok(())
    }

    pub async fn get_analysis(&self, id: &str) -> Result<Option<AnalysisRecord>> {
        let row: Option<AnalysisRow> = sqlx::query_as(
            r#"
            SELECT id, repo_owner, repo_name, pr_number, action,
                   result_json, health_json, coverage_json, dependencies_json,
                   skipped_json, diff_digest, created_at
            FROM analyses
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch analysis record")?;

        row.map(AnalysisRow::into_record).transpose()
    }

    // ========================================================================
    // Companion changes
    // ========================================================================

    pub async fn register_companion(&self, companion: &CompanionChange) -> Result<()> {
        let artifacts_json = serde_json::to_string(&companion.artifacts)?;

        sqlx::query(
            r#"
            INSERT INTO companion_changes
                (id, repo_owner, repo_name, source_pr, companion_pr, branch, artifacts_json, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&companion.id)
        .bind(&companion.repo.owner)
        .bind(&companion.repo.name)
        .bind(companion.source_pr)
        .bind(companion.companion_pr)
        .bind(&companion.branch)
        .bind(&artifacts_json)
        .bind(companion.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to register companion change")?;

        Ok(())
    }

    /// Replace the stored artifact set after a fix lands on the branch
    pub async fn update_companion_artifacts(
        &self,
        companion_id: &str,
        artifacts: &[CommitFile],
    ) -> Result<()> {
        let artifacts_json = serde_json::to_string(artifacts)?;

        sqlx::query("UPDATE companion_changes SET artifacts_json = $1 WHERE id = $2")
            .bind(&artifacts_json)
            .bind(companion_id)
            .execute(&self.pool)
            .await
            .context("Failed to update companion artifacts")?;

        Ok(())
    }

    /// Companion lookup by head branch; this is how check_run events are
    /// matched to the changes we opened.
    pub async fn companion_by_branch(
        &self,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<Option<CompanionChange>> {
        let row: Option<(String, i64, i64, String, String, String)> = sqlx::query_as(
            r#"
            SELECT id, source_pr, companion_pr, branch, artifacts_json, created_at
            FROM companion_changes
            WHERE repo_owner = $1 AND repo_name = $2 AND branch = $3
            "#,
        )
        .bind(&repo.owner)
        .bind(&repo.name)
        .bind(branch)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch companion change")?;

        row.map(
            |(id, source_pr, companion_pr, branch, artifacts_json, created_at)| {
                Ok(CompanionChange {
                    id,
                    repo: repo.clone(),
                    source_pr,
                    companion_pr,
                    branch,
                    artifacts: serde_json::from_str(&artifacts_json)
                        .context("Corrupt artifacts_json column")?,
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .context("Corrupt created_at column")?
                        .with_timezone(&Utc),
                })
            },
        )
        .transpose()
    }

    // ========================================================================
    // Remediation state
    // ========================================================================

    /// Attempts used so far and the last recorded status, if any
    pub async fn remediation_state(&self, companion_id: &str) -> Result<Option<(u32, String)>> {
        let row: Option<(i64, String)> = sqlx::query_as(
            "SELECT attempts, status FROM remediation_state WHERE companion_id = $1",
        )
        .bind(companion_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch remediation state")?;

        Ok(row.map(|(attempts, status)| (attempts.max(0) as u32, status)))
    }

    /// Record one attempt. The caller is authoritative for the count; the
    /// row mirrors it so restarts resume where the loop left off.
    pub async fn record_remediation_attempt(
        &self,
        companion_id: &str,
        attempts: u32,
        status: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO remediation_state (companion_id, attempts, status, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT(companion_id) DO UPDATE SET
                attempts = excluded.attempts,
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(companion_id)
        .bind(attempts as i64)
        .bind(status)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to record remediation attempt")?;

        Ok(())
    }

    /// Terminal status update without touching the attempt count
    pub async fn set_remediation_status(&self, companion_id: &str, status: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO remediation_state (companion_id, attempts, status, updated_at)
            VALUES ($1, 0, $2, $3)
            ON CONFLICT(companion_id) DO UPDATE SET
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(companion_id)
        .bind(status)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to update remediation status")?;

        Ok(())
    }
}
