// src/state.rs
// Shared application state threaded through handlers and the analysis pipeline

use std::sync::Arc;

use anyhow::Result;

use crate::analysis::{AuxAnalyzers, HeuristicAnalyzers};
use crate::config::VigilConfig;
use crate::github::{ChangeHost, GitHubClient};
use crate::llm::{AnalysisCapability, CapabilityClient};
use crate::notify::live::LiveUpdateHub;
use crate::notify::ChatNotifier;
use crate::store::VigilStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: VigilConfig,

    /// Analysis history and companion-change registry
    pub store: VigilStore,

    /// Change host API (GitHub in production, mocks in tests)
    pub host: Arc<dyn ChangeHost>,

    /// Primary analysis capability (LLM behind an OpenAI-compatible API)
    pub capability: Arc<dyn AnalysisCapability>,

    /// Deterministic auxiliary analyzers
    pub analyzers: Arc<dyn AuxAnalyzers>,

    /// Chat webhook notifier
    pub chat: ChatNotifier,

    /// Live dashboard event broadcaster
    pub live: LiveUpdateHub,
}

impl AppState {
    /// Wire up production components from configuration. The store must
    /// already be connected and migrated.
    pub fn new(config: VigilConfig, store: VigilStore) -> Result<Self> {
        let host = Arc::new(GitHubClient::new(&config)?);
        let capability = Arc::new(CapabilityClient::new(&config)?);
        let chat = ChatNotifier::new(&config);
        let live = LiveUpdateHub::new();

        Ok(Self {
            config,
            store,
            host,
            capability,
            analyzers: Arc::new(HeuristicAnalyzers),
            chat,
            live,
        })
    }
}
