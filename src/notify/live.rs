// src/notify/live.rs
// Live update fan-out to dashboard WebSocket clients

use crate::analysis::types::{AnalysisPhase, AnalysisRecord, ChangeAction, ChangeRef};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing::debug;

/// One frame pushed to dashboard clients
#[derive(Debug, Clone, Serialize)]
pub struct LiveUpdate {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(rename = "dataType")]
    pub data_type: &'static str,
    pub data: Value,
}

impl LiveUpdate {
    fn data(data_type: &'static str, data: Value) -> Self {
        Self {
            kind: "data",
            data_type,
            data,
        }
    }
}

/// Broadcast hub for dashboard updates. Slow subscribers lag and drop
/// frames; they never block the pipeline.
#[derive(Clone)]
pub struct LiveUpdateHub {
    tx: broadcast::Sender<LiveUpdate>,
}

impl Default for LiveUpdateHub {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveUpdateHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveUpdate> {
        self.tx.subscribe()
    }

    fn send(&self, update: LiveUpdate) {
        // Ignore send errors (no subscribers is fine)
        let _ = self.tx.send(update);
    }

    pub fn analysis_started(&self, change: &ChangeRef, action: ChangeAction) {
        self.send(LiveUpdate::data(
            "analysis_started",
            json!({
                "change": change.to_string(),
                "action": action.as_str(),
            }),
        ));
    }

    pub fn analysis_completed(&self, record: &AnalysisRecord) {
        match serde_json::to_value(record) {
            Ok(data) => self.send(LiveUpdate::data("analysis_completed", data)),
            Err(e) => debug!("Skipping live update, record not serializable: {e}"),
        }
    }

    pub fn analysis_failed(&self, change: &ChangeRef, phase: AnalysisPhase, error: &str) {
        self.send(LiveUpdate::data(
            "analysis_failed",
            json!({
                "change": change.to_string(),
                "phase": phase.as_str(),
                "error": error,
            }),
        ));
    }

    pub fn companion_opened(&self, source: &ChangeRef, companion_pr: i64, branch: &str) {
        self.send(LiveUpdate::data(
            "companion_opened",
            json!({
                "source": source.to_string(),
                "companion_pr": companion_pr,
                "branch": branch,
            }),
        ));
    }

    pub fn remediation_update(&self, change: &ChangeRef, attempt: u32, status: &str) {
        self.send(LiveUpdate::data(
            "remediation_update",
            json!({
                "change": change.to_string(),
                "attempt": attempt,
                "status": status,
            }),
        ));
    }

    pub fn notification(&self, message: &str) {
        self.send(LiveUpdate::data(
            "notification",
            json!({ "message": message }),
        ));
    }
}
