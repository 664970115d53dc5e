//! The streaming chat endpoint.
//!
//! `POST /api/chat {message, sessionId?}` responds with server-sent events:
//! `data: {"content": "..."}` for each answer fragment, then a terminal
//! `data: {"done": true, "sessionId": "..."}`. Failures after the stream has
//! started arrive as `data: {"error": "..."}`. Aborting the response cancels
//! the turn upstream.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream};
use serde::Deserialize;

use crate::core::errors::ApiError;
use crate::rag::ChatFrame;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    axum::Json(payload): axum::Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let visitor_ip = client_ip(&headers);

    let rx = state
        .chat
        .respond(payload.message, payload.session_id, visitor_ip)?;

    let event_stream = stream::unfold(rx, |mut rx| async move {
        let frame = rx.recv().await?;
        Some((Ok(frame_to_event(&frame)), rx))
    });

    Ok(Sse::new(event_stream).keep_alive(KeepAlive::default()))
}

fn frame_to_event(frame: &ChatFrame) -> Event {
    let data = serde_json::to_string(frame).unwrap_or_else(|_| "{}".to_string());
    Event::default().data(data)
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers.get("x-forwarded-for")?.to_str().ok()?;
    forwarded
        .split(',')
        .next()
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}
