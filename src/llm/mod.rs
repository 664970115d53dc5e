pub mod completions;
pub mod embeddings;
pub mod types;

pub use completions::{CompletionClient, HttpCompletions};
pub use embeddings::{EmbeddingClient, HttpEmbeddings};
pub use types::ChatMessage;
