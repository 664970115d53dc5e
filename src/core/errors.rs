use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Failure talking to the embedding provider.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("embedding provider returned {code}: {body}")]
    Status { code: u16, body: String },
    #[error("malformed embedding response: {0}")]
    MalformedResponse(String),
}

/// Failure talking to the completion provider, before or during a stream.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("completion provider returned {code}: {body}")]
    Status { code: u16, body: String },
    #[error("completion stream failed: {0}")]
    Stream(String),
    #[error("completion stream idle for {0}s")]
    IdleTimeout(u64),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("failed to persist vector index: {0}")]
    Persistence(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("service unavailable")]
    ServiceUnavailable,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }
}

/// Provider statuses worth retrying later rather than reporting as our fault.
fn upstream_unavailable(code: u16) -> bool {
    matches!(code, 429 | 502 | 503)
}

impl From<EmbeddingError> for ApiError {
    fn from(err: EmbeddingError) -> Self {
        match &err {
            EmbeddingError::Status { code, .. } if upstream_unavailable(*code) => {
                ApiError::ServiceUnavailable
            }
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<CompletionError> for ApiError {
    fn from(err: CompletionError) -> Self {
        match &err {
            CompletionError::Status { code, .. } if upstream_unavailable(*code) => {
                ApiError::ServiceUnavailable
            }
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<IndexError> for ApiError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::DimensionMismatch { .. } => ApiError::BadRequest(err.to_string()),
            IndexError::Persistence(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::ServiceUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service unavailable".to_string(),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
