//! Knowledge-base document endpoints.
//!
//! Ingestion accepts pre-extracted plain text; crawling and file extraction
//! happen upstream of this service.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;
use crate::storage::SourceType;

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub title: String,
    pub content: String,
    #[serde(rename = "sourceType")]
    pub source_type: Option<SourceType>,
    #[serde(rename = "sourceUrl")]
    pub source_url: Option<String>,
}

pub async fn create_document(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<IngestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }

    if let Some(url) = payload.source_url.as_deref() {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ApiError::BadRequest(format!("invalid source url: {}", url)));
        }
    }

    let report = state
        .ingestor
        .ingest(
            payload.title.trim(),
            &payload.content,
            payload.source_type.unwrap_or(SourceType::Upload),
            payload.source_url.as_deref(),
        )
        .await?;

    Ok(Json(report))
}

pub async fn list_documents(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let documents = state.storage.list_documents().await?;
    Ok(Json(documents))
}

pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state.ingestor.delete_document(&document_id).await?;
    Ok(Json(json!({ "success": true, "removedChunks": removed })))
}
