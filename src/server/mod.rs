// src/server/mod.rs
// HTTP layer: router assembly plus the two tiny read endpoints

pub mod error;
pub mod webhook;
pub mod ws;

use axum::{
    extract::{Path, State},
    http::HeaderValue,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::server::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Create the web server router
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origin);

    Router::new()
        .route("/health", get(health))
        .route("/webhooks/github", post(webhook::handle_webhook))
        .route("/analyses/{id}", get(get_analysis))
        .route("/ws", get(ws::handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    if origin == "*" {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    match origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        Err(_) => {
            warn!(origin, "Invalid CORS origin; falling back to any");
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "vigil",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Debug/dashboard read of one persisted analysis record
async fn get_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let record = state
        .store
        .get_analysis(&id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load analysis: {e:#}")))?
        .ok_or_else(|| ApiError::not_found(format!("No analysis with id {id}")))?;

    let body = serde_json::to_value(&record)
        .map_err(|e| ApiError::internal(format!("Failed to serialize analysis: {e}")))?;
    Ok(Json(body))
}
