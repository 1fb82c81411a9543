// src/notify/mod.rs
// Outbound chat notifications for completed runs and escalations

pub mod live;

use crate::analysis::types::{AnalysisRecord, RiskLevel};
use crate::config::VigilConfig;
use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::json;
use tracing::debug;

/// Posts run summaries to a chat webhook (Slack-compatible `{"text": ...}`
/// payload). An empty webhook URL disables delivery entirely.
#[derive(Clone)]
pub struct ChatNotifier {
    http: Client,
    webhook_url: String,
}

impl ChatNotifier {
    pub fn new(config: &VigilConfig) -> Self {
        Self {
            http: Client::new(),
            webhook_url: config.chat_webhook_url.clone(),
        }
    }

    pub fn enabled(&self) -> bool {
        !self.webhook_url.is_empty()
    }

    async fn post(&self, text: String) -> Result<()> {
        if !self.enabled() {
            debug!("Chat notifications disabled, dropping message");
            return Ok(());
        }

        let response = self
            .http
            .post(&self.webhook_url)
            .json(&json!({ "text": text }))
            .send()
            .await
            .context("Failed to send chat notification")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!("Chat webhook error {}: {}", status, error_text));
        }

        Ok(())
    }

    /// Plain one-line report of an action the service took
    pub async fn send_action_report(&self, message: &str) -> Result<()> {
        self.post(message.to_string()).await
    }

    /// Summary message for one completed analysis run
    pub async fn send_analysis_report(&self, record: &AnalysisRecord) -> Result<()> {
        self.post(format_analysis_report(record)).await
    }

    /// High-priority message; callers use this for critical findings and
    /// remediation escalations
    pub async fn send_critical_alert(&self, message: &str) -> Result<()> {
        self.post(format!("🚨 {message}")).await
    }
}

fn format_analysis_report(record: &AnalysisRecord) -> String {
    let critical = record.result.finding_count(RiskLevel::Critical);
    let findings = if record.result.findings.is_empty() {
        "no findings".to_string()
    } else if critical > 0 {
        format!("{} findings ({} critical)", record.result.findings.len(), critical)
    } else {
        format!("{} findings", record.result.findings.len())
    };

    format!(
        "Vigil analyzed {}: {} risk ({}/100), {} — health {} ({}, {}), {}",
        record.change,
        record.result.risk_level,
        record.result.risk_score,
        record.result.merge_recommendation.as_str(),
        record.health.score,
        record.health.status.as_str(),
        record.health.trend.as_str(),
        findings,
    )
}
