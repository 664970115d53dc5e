//! Retrieval-augmented chatbot backend.
//!
//! Ingests plain-text documents into a file-backed vector index and answers
//! visitor questions over HTTP by retrieving similar chunks and streaming an
//! LLM-generated, citation-tracked response.

pub mod core;
pub mod llm;
pub mod rag;
pub mod server;
pub mod state;
pub mod storage;
