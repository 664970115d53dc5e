use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let stats = state.storage.stats().await?;
    let index_size = state.index.len().await;

    Ok(Json(json!({
        "documents": stats.documents,
        "conversations": stats.conversations,
        "messages": stats.messages,
        "indexedChunks": index_size,
    })))
}
