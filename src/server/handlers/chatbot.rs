use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::core::errors::ApiError;
use crate::state::AppState;
use crate::storage::ChatbotUpdate;

pub async fn get_chatbot(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let chatbot = state.storage.get_chatbot().await?;
    Ok(Json(chatbot))
}

pub async fn update_chatbot(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatbotUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let chatbot = state.storage.update_chatbot(payload).await?;
    Ok(Json(chatbot))
}
