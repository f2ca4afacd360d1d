//! Inbound HTTP boundary: OpenAI-compatible routes.

pub mod openai;
pub mod sse;

use crate::orchestrator::JobOrchestrator;
use crate::store::CredentialStore;
use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Reference images arrive inline as base64, so the body limit is generous.
const MAX_BODY_BYTES: usize = 100 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<JobOrchestrator>,
    pub store: Arc<CredentialStore>,
    pub api_keys: Arc<Vec<String>>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(openai::chat_completions))
        .route("/v1/models", get(openai::list_models))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::auth_middleware,
        ))
        .with_state(state)
}

#[cfg(test)]
mod tests;

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshots = state.store.snapshots();
    let selectable = snapshots.iter().filter(|s| s.status.is_selectable()).count();
    Json(serde_json::json!({
        "status": "ok",
        "accounts": snapshots.len(),
        "selectable": selectable,
    }))
}
