//! HTTP route handlers.

pub mod chat;
pub mod sessions;
pub mod ui;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use ragchat_core::Error;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the main Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(ui::routes())
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/config", get(get_config))
        .merge(sessions::routes())
        .merge(chat::routes())
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.sessions.len(),
    }))
}

/// Non-secret configuration.
async fn get_config(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "llmProvider": state.llm_config.provider.to_string(),
        "llmModel": state.llm_config.model,
        "embeddingModel": state.config.retrieval.embedding_model,
        "judgeModel": state.judge_model,
        "docsDir": state.config.docs_dir.display().to_string(),
        "topK": state.config.retrieval.top_k,
    }))
}

pub(crate) fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// JSON `{ "error": ... }` body for a failed pass.
pub(crate) fn error_response(error: &Error) -> (StatusCode, Json<serde_json::Value>) {
    (status_for(error), Json(json!({ "error": error.to_string() })))
}
