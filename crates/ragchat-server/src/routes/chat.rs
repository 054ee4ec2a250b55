//! Streaming chat route: one render pass delivered as SSE.
//!
//! Event order: `view` (transcript with the user message), `token`s,
//! `answer`, `warning`s and `metrics` from evaluation, the final `view`, then
//! `[DONE]`. A failed pass emits `error` and stops.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::Stream;
use ragchat_chat::providers::StreamChunk;
use ragchat_chat::ChatMessage;
use serde::Serialize;
use tokio_stream::StreamExt;
use tracing::error;

use super::error_response;
use super::sessions::{lookup, MessageRequest};
use crate::controller::{render, ControllerState, Pass, PassInput, View};
use crate::session::SidebarMetric;
use crate::state::AppState;

type SseStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    View { view: View },
    Token { content: String },
    Answer { content: String },
    Metrics { metrics: Vec<SidebarMetric> },
    Warning { message: String },
    Error { error: String },
}

fn sse(event: &StreamEvent) -> Result<Event, Infallible> {
    Ok(Event::default()
        .json_data(event)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string())))
}

fn done() -> Result<Event, Infallible> {
    Ok(Event::default().data("[DONE]"))
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/sessions/{id}/messages/stream", post(stream_message))
}

async fn stream_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<MessageRequest>,
) -> Response {
    let handle = match lookup(&state, &id) {
        Ok(handle) => handle,
        Err(e) => return error_response(&e).into_response(),
    };

    let sse_stream: SseStream = Box::pin(async_stream::stream! {
        let mut session = handle.lock_owned().await;
        let input = PassInput::chat(req.content);

        let turn = match state.controller.begin(&mut session, &input).await {
            Ok(Pass::Rendered(view)) => {
                yield sse(&StreamEvent::View { view });
                yield done();
                return;
            }
            Ok(Pass::Due(turn)) => turn,
            Err(e) => {
                error!("Session {}: pass failed: {}", session.id, e);
                yield sse(&StreamEvent::Error { error: e.to_string() });
                return;
            }
        };

        yield sse(&StreamEvent::View {
            view: render(&session, ControllerState::AwaitingResponse),
        });

        let mut tokens = match turn.chain.stream(&turn.question, &session.chat_history).await {
            Ok(tokens) => tokens,
            Err(e) => {
                error!("Session {}: chain failed: {}", session.id, e);
                yield sse(&StreamEvent::Error { error: e.to_string() });
                return;
            }
        };

        let mut content = String::new();
        while let Some(chunk) = tokens.next().await {
            match chunk {
                StreamChunk::Token(text) => {
                    content.push_str(&text);
                    yield sse(&StreamEvent::Token { content: text });
                }
                StreamChunk::Done { .. } => break,
                StreamChunk::Error(e) => {
                    error!("Session {}: chain failed: {}", session.id, e);
                    yield sse(&StreamEvent::Error { error: e });
                    return;
                }
            }
        }

        // Commit before scoring.
        session.chat_history.add_exchange(&turn.question, &content);
        session.push_message(ChatMessage::assistant(content.clone()));
        yield sse(&StreamEvent::Answer { content: content.clone() });

        let sidebar = state.controller.evaluate(&turn, &content).await;
        for message in &sidebar.errors {
            yield sse(&StreamEvent::Warning { message: message.clone() });
        }
        yield sse(&StreamEvent::Metrics { metrics: sidebar.metrics.clone() });

        session.sidebar = sidebar;
        yield sse(&StreamEvent::View {
            view: render(&session, ControllerState::Idle),
        });
        yield done();
    });

    Sse::new(sse_stream).keep_alive(KeepAlive::default()).into_response()
}
