// src/llm/mod.rs
// Analysis capability: the trait the pipeline calls and its OpenAI-compatible client

pub mod schema;

use crate::analysis::error::AnalysisError;
use crate::analysis::types::{AnalysisRequest, AnalysisResult, TestScenario};
use crate::config::VigilConfig;
use crate::github::CommitFile;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use schema::{FixPayload, TestFile, TestGenResponse};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Fixes below this confidence still apply but get flagged in the log
const LOW_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// The reasoning capability behind analysis, remediation, and test
/// generation. One production implementation; tests substitute their own.
#[async_trait]
pub trait AnalysisCapability: Send + Sync {
    /// Produce a risk verdict for a change
    async fn analyze(
        &self,
        request: &AnalysisRequest,
        hints: &[String],
    ) -> Result<AnalysisResult, AnalysisError>;

    /// Propose a fix for failing companion checks; `None` means the
    /// capability declined or returned nothing usable
    async fn request_fix(
        &self,
        diagnostics: &str,
        artifacts: &[CommitFile],
    ) -> Result<Option<FixPayload>>;

    /// Write test files covering the given scenarios
    async fn generate_tests(
        &self,
        request: &AnalysisRequest,
        scenarios: &[TestScenario],
    ) -> Result<Vec<TestFile>>;
}

// ============================================================================
// OpenAI-compatible client
// ============================================================================

pub struct CapabilityClient {
    http: Client,
    chat_url: String,
    api_key: String,
    model: String,
    max_output_tokens: usize,
    trust_capability_block: bool,
}

impl CapabilityClient {
    pub fn new(config: &VigilConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.capability_timeout))
            .build()
            .context("Failed to build capability HTTP client")?;

        Ok(Self {
            http,
            chat_url: config.capability_api_url("chat/completions"),
            api_key: config.capability_api_key.clone(),
            model: config.capability_model.clone(),
            max_output_tokens: config.capability_max_output_tokens,
            trust_capability_block: config.trust_capability_block,
        })
    }

    /// One chat-completion round trip; returns the assistant text
    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "max_completion_tokens": self.max_output_tokens,
        });

        debug!(model = %self.model, prompt_bytes = user.len(), "Sending capability request");

        let response = self
            .http
            .post(&self.chat_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .context("Failed to send capability request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!("Capability API error {}: {}", status, error_text));
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse capability response")?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        if content.is_empty() {
            return Err(anyhow::anyhow!("Capability returned an empty completion"));
        }

        Ok(content)
    }
}

#[async_trait]
impl AnalysisCapability for CapabilityClient {
    async fn analyze(
        &self,
        request: &AnalysisRequest,
        hints: &[String],
    ) -> Result<AnalysisResult, AnalysisError> {
        let system = schema::with_schema::<AnalysisResult>(schema::ANALYSIS_SYSTEM_PROMPT);
        let user = schema::analysis_user_prompt(request, hints);

        let content = self
            .chat(&system, &user)
            .await
            .map_err(AnalysisError::Capability)?;

        let mut result: AnalysisResult = schema::parse_capability_json(&content)
            .map_err(AnalysisError::MalformedVerdict)?;

        schema::enforce_result_policy(&mut result, self.trust_capability_block);
        Ok(result)
    }

    async fn request_fix(
        &self,
        diagnostics: &str,
        artifacts: &[CommitFile],
    ) -> Result<Option<FixPayload>> {
        let system = schema::with_schema::<FixPayload>(schema::FIX_SYSTEM_PROMPT);
        let user = schema::fix_user_prompt(diagnostics, artifacts);

        let content = self.chat(&system, &user).await?;

        let fix: FixPayload = match schema::parse_capability_json(&content) {
            Ok(fix) => fix,
            Err(e) => {
                warn!("Discarding unparseable fix response: {e}");
                return Ok(None);
            }
        };

        if !fix.is_usable() {
            warn!("Capability declined to fix or returned placeholder content");
            return Ok(None);
        }
        if fix.confidence < LOW_CONFIDENCE_THRESHOLD {
            warn!(confidence = fix.confidence, "Applying low-confidence fix");
        }

        Ok(Some(fix))
    }

    async fn generate_tests(
        &self,
        request: &AnalysisRequest,
        scenarios: &[TestScenario],
    ) -> Result<Vec<TestFile>> {
        let system = schema::with_schema::<TestGenResponse>(schema::TESTGEN_SYSTEM_PROMPT);
        let user = schema::testgen_user_prompt(request, scenarios);

        let content = self.chat(&system, &user).await?;

        let parsed: TestGenResponse = schema::parse_capability_json(&content)
            .map_err(|e| anyhow::anyhow!("Unusable test generation response: {e}"))?;

        Ok(parsed.files)
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}
