//! Retrieval-augmented generation pipeline.
//!
//! Write path: document → chunker → embedding client → vector index.
//! Read path: question → embedding client → index search → chat engine →
//! completion stream → caller.

pub mod chat;
pub mod chunker;
pub mod index;
pub mod ingest;

pub use chat::{ChatEngine, ChatFrame, Citation};
pub use index::{VectorIndex, VectorRecord};
pub use ingest::{IngestReport, Ingestor};
