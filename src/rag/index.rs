//! File-backed in-memory vector index.
//!
//! Holds every embedding record in memory and answers k-nearest-neighbor
//! queries with a brute-force cosine scan. The full index is serialized to a
//! JSON snapshot after every mutation (write-through); on startup the snapshot
//! is loaded or an empty index is created. At the expected corpus scale
//! (thousands of chunks) the linear scan and full rewrites are deliberate
//! simplicity over throughput.
//!
//! Mutations take the write lock across both the in-memory change and the
//! snapshot write, so concurrent writers cannot interleave a torn snapshot.
//! Searches take read locks and may run concurrently with each other.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::errors::IndexError;

/// One embedded chunk: the unit stored and retrieved by the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub document_id: String,
    pub chunk_text: String,
    pub chunk_index: usize,
    pub vector: Vec<f32>,
}

/// A search result with its cosine similarity to the query.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub record: VectorRecord,
    pub similarity: f32,
}

pub struct VectorIndex {
    records: RwLock<Vec<VectorRecord>>,
    snapshot_path: PathBuf,
}

impl VectorIndex {
    /// Load the snapshot at `snapshot_path`, or start empty when it is
    /// missing or unreadable (a corrupt snapshot is logged and discarded; the
    /// relational mirror remains available for a rebuild).
    pub fn load(snapshot_path: PathBuf) -> Self {
        let records = match fs::read_to_string(&snapshot_path) {
            Ok(contents) => match serde_json::from_str::<Vec<VectorRecord>>(&contents) {
                Ok(records) => records,
                Err(err) => {
                    tracing::error!(
                        "Discarding corrupt vector snapshot {}: {}",
                        snapshot_path.display(),
                        err
                    );
                    Vec::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                tracing::error!(
                    "Failed to read vector snapshot {}: {}",
                    snapshot_path.display(),
                    err
                );
                Vec::new()
            }
        };

        if !records.is_empty() {
            tracing::info!("Loaded {} vectors from snapshot", records.len());
        }

        Self {
            records: RwLock::new(records),
            snapshot_path,
        }
    }

    /// Append a record and persist the snapshot.
    ///
    /// The new vector's dimensionality must match the records already stored;
    /// mixing dimensions would make every similarity score meaningless.
    pub async fn add(&self, record: VectorRecord) -> Result<(), IndexError> {
        let mut records = self.records.write().await;

        if let Some(existing) = records.first() {
            if existing.vector.len() != record.vector.len() {
                return Err(IndexError::DimensionMismatch {
                    expected: existing.vector.len(),
                    got: record.vector.len(),
                });
            }
        }

        records.push(record);
        self.persist(&records)
    }

    /// Top-`k` records by cosine similarity, descending. Empty index yields
    /// an empty result; a query of the wrong dimensionality is rejected.
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        let records = self.records.read().await;

        if records.is_empty() {
            return Ok(Vec::new());
        }

        let stored_dim = records[0].vector.len();
        if query.len() != stored_dim {
            return Err(IndexError::DimensionMismatch {
                expected: stored_dim,
                got: query.len(),
            });
        }

        let mut hits: Vec<SearchHit> = records
            .iter()
            .map(|record| SearchHit {
                similarity: cosine_similarity(query, &record.vector),
                record: record.clone(),
            })
            .collect();

        hits.sort_by(|left, right| {
            right
                .similarity
                .partial_cmp(&left.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);

        Ok(hits)
    }

    /// Remove every record belonging to `document_id` and persist. Returns
    /// the number of records removed.
    pub async fn delete_by_document(&self, document_id: &str) -> Result<usize, IndexError> {
        let mut records = self.records.write().await;

        let before = records.len();
        records.retain(|record| record.document_id != document_id);
        let removed = before - records.len();

        if removed > 0 {
            self.persist(&records)?;
        }

        Ok(removed)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Write the full snapshot via a temp file and rename, so a crash
    /// mid-write never leaves a truncated snapshot behind. A failed write
    /// leaves the in-memory index authoritative; durability catches up on the
    /// next successful mutation.
    fn persist(&self, records: &[VectorRecord]) -> Result<(), IndexError> {
        let payload = serde_json::to_vec(records)
            .map_err(|err| IndexError::Persistence(std::io::Error::other(err)))?;

        let tmp_path = self.snapshot_path.with_extension("json.tmp");
        fs::write(&tmp_path, payload)?;
        fs::rename(&tmp_path, &self.snapshot_path)?;
        Ok(())
    }
}

/// Cosine similarity between two equal-length vectors.
///
/// When either vector has (near-)zero magnitude the angle is undefined; this
/// returns 0.0 rather than dividing by zero, so such records sort below any
/// genuinely similar ones.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}
