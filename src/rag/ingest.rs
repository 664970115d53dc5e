//! Document ingestion: chunk, embed, mirror, index.
//!
//! Chunks are embedded sequentially, one upstream call at a time; throughput
//! is bounded by embedding round-trip latency, which is fine at knowledge-base
//! scale. A chunk whose embedding fails is counted in the report instead of
//! being dropped silently, so callers can see partial success.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::core::errors::{ApiError, IndexError};
use crate::llm::EmbeddingClient;
use crate::rag::chunker::chunk_text;
use crate::rag::index::{VectorIndex, VectorRecord};
use crate::storage::{SourceType, Storage};

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    pub title: String,
    pub chunks_total: usize,
    pub chunks_indexed: usize,
    pub chunks_failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_error: Option<String>,
}

pub struct Ingestor {
    storage: Storage,
    index: Arc<VectorIndex>,
    embeddings: Arc<dyn EmbeddingClient>,
    chunk_size: usize,
}

impl Ingestor {
    pub fn new(
        storage: Storage,
        index: Arc<VectorIndex>,
        embeddings: Arc<dyn EmbeddingClient>,
        chunk_size: usize,
    ) -> Self {
        Self {
            storage,
            index,
            embeddings,
            chunk_size,
        }
    }

    /// Ingest one document of pre-extracted plain text: create the document
    /// row, then chunk → embed → mirror row → index record, chunk by chunk.
    pub async fn ingest(
        &self,
        title: &str,
        content: &str,
        source_type: SourceType,
        source_url: Option<&str>,
    ) -> Result<IngestReport, ApiError> {
        if content.trim().is_empty() {
            return Err(ApiError::BadRequest(
                "document content must not be empty".to_string(),
            ));
        }

        let document = self
            .storage
            .create_document(title, content, source_type, source_url)
            .await?;

        let chunks = chunk_text(content, self.chunk_size);
        let mut report = IngestReport {
            document_id: document.id.clone(),
            title: document.title.clone(),
            chunks_total: chunks.len(),
            chunks_indexed: 0,
            chunks_failed: 0,
            first_error: None,
        };

        for (chunk_index, chunk) in chunks.into_iter().enumerate() {
            let vector = match self.embeddings.embed(&chunk).await {
                Ok(vector) => vector,
                Err(err) => {
                    tracing::warn!(
                        "Embedding failed for chunk {} of document {}: {}",
                        chunk_index,
                        document.id,
                        err
                    );
                    report.chunks_failed += 1;
                    report.first_error.get_or_insert(err.to_string());
                    continue;
                }
            };

            let embedding_id = Uuid::new_v4().to_string();
            self.storage
                .create_embedding_record(&embedding_id, &document.id, &chunk, chunk_index)
                .await?;

            let record = VectorRecord {
                id: embedding_id,
                document_id: document.id.clone(),
                chunk_text: chunk,
                chunk_index,
                vector,
            };

            match self.index.add(record).await {
                Ok(()) => report.chunks_indexed += 1,
                Err(err @ IndexError::DimensionMismatch { .. }) => {
                    tracing::warn!(
                        "Rejected chunk {} of document {}: {}",
                        chunk_index,
                        document.id,
                        err
                    );
                    report.chunks_failed += 1;
                    report.first_error.get_or_insert(err.to_string());
                }
                Err(IndexError::Persistence(err)) => {
                    // In-memory index stays correct; durability catches up on
                    // the next successful write.
                    tracing::error!("Vector snapshot write failed: {}", err);
                    report.chunks_indexed += 1;
                }
            }
        }

        tracing::info!(
            "Ingested document {} ({}): {}/{} chunks indexed",
            document.id,
            document.title,
            report.chunks_indexed,
            report.chunks_total
        );

        Ok(report)
    }

    /// Delete a document everywhere: vector index first, then the document
    /// row (embedding mirror rows cascade). Returns the number of index
    /// records removed.
    pub async fn delete_document(&self, document_id: &str) -> Result<usize, ApiError> {
        let removed = match self.index.delete_by_document(document_id).await {
            Ok(removed) => removed,
            Err(IndexError::Persistence(err)) => {
                tracing::error!("Vector snapshot write failed during delete: {}", err);
                0
            }
            Err(err) => return Err(err.into()),
        };

        let existed = self.storage.delete_document(document_id).await?;
        if !existed {
            return Err(ApiError::NotFound(format!(
                "document {} not found",
                document_id
            )));
        }

        tracing::info!(
            "Deleted document {} ({} index records)",
            document_id,
            removed
        );
        Ok(removed)
    }
}
