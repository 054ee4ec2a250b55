//! Session routes: each request is one render pass.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ragchat_core::{Error, HUGGINGFACEHUB_API_TOKEN, OPENAI_API_KEY};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::error_response;
use crate::controller::PassInput;
use crate::session::SessionHandle;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CredentialRequest {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub content: String,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(render_session))
        .route("/sessions/{id}/credentials", post(submit_credential))
        .route("/sessions/{id}/messages", post(send_message))
}

pub(crate) fn lookup(state: &AppState, id: &str) -> Result<SessionHandle, Error> {
    state
        .sessions
        .get(id)
        .ok_or_else(|| Error::NotFound(format!("Session not found: {}", id)))
}

async fn run_pass(state: &AppState, handle: SessionHandle, input: PassInput) -> Response {
    let mut session = handle.lock().await;
    match state.controller.run_pass(&mut session, &input).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => {
            error!("Session {}: pass failed: {}", session.id, e);
            let (status, Json(mut body)) = error_response(&e);
            body["sessionId"] = json!(session.id);
            (status, Json(body)).into_response()
        }
    }
}

async fn create_session(State(state): State<Arc<AppState>>) -> Response {
    let handle = state.sessions.create();
    run_pass(&state, handle, PassInput::default()).await
}

async fn render_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match lookup(&state, &id) {
        Ok(handle) => run_pass(&state, handle, PassInput::default()).await,
        Err(e) => error_response(&e).into_response(),
    }
}

async fn submit_credential(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CredentialRequest>,
) -> Response {
    let handle = match lookup(&state, &id) {
        Ok(handle) => handle,
        Err(e) => return error_response(&e).into_response(),
    };
    if req.key != OPENAI_API_KEY.key && req.key != HUGGINGFACEHUB_API_TOKEN.key {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("Unknown credential: {}", req.key) })),
        )
            .into_response();
    }
    run_pass(&state, handle, PassInput::credential(req.key, req.value)).await
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<MessageRequest>,
) -> Response {
    match lookup(&state, &id) {
        Ok(handle) => run_pass(&state, handle, PassInput::chat(req.content)).await,
        Err(e) => error_response(&e).into_response(),
    }
}
