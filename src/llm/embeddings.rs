//! Embedding provider client.
//!
//! Talks to an OpenAI-compatible `/embeddings` endpoint with one fixed model
//! per deployment. Responses are parsed into typed structs at the boundary;
//! nothing downstream ever sees the raw payload.
//!
//! Identical text is re-embedded on every call. Caching would cut cost for
//! repeated ingests of the same content, but the index is the only consumer
//! and corpora are small, so the simpler client wins for now.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::core::config::settings::EmbeddingSettings;
use crate::core::errors::EmbeddingError;

/// Turns a text span into a fixed-length dense vector.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

#[derive(Clone)]
pub struct HttpEmbeddings {
    base_url: String,
    api_key: String,
    model: String,
    client: Client,
}

impl HttpEmbeddings {
    pub fn new(settings: &EmbeddingSettings) -> Self {
        Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            client: Client::new(),
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/embeddings", self.base_url);

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(EmbeddingError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let payload: EmbeddingResponse = res
            .json()
            .await
            .map_err(|err| EmbeddingError::MalformedResponse(err.to_string()))?;

        let vector = payload
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| EmbeddingError::MalformedResponse("empty data array".to_string()))?;

        if vector.is_empty() {
            return Err(EmbeddingError::MalformedResponse(
                "empty embedding vector".to_string(),
            ));
        }

        Ok(vector)
    }
}
