use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let conversations = state.storage.list_conversations().await?;
    Ok(Json(conversations))
}

pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state.storage.get_messages(&conversation_id).await?;
    Ok(Json(messages))
}
