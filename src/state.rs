use std::sync::Arc;

use crate::core::config::{AppPaths, Settings};
use crate::llm::{CompletionClient, EmbeddingClient, HttpCompletions, HttpEmbeddings};
use crate::rag::{ChatEngine, Ingestor, VectorIndex};
use crate::storage::Storage;

/// Everything a request handler needs, built once at startup and passed by
/// handle. There is deliberately no process-wide implicit state.
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub settings: Settings,
    pub storage: Storage,
    pub index: Arc<VectorIndex>,
    pub ingestor: Ingestor,
    pub chat: Arc<ChatEngine>,
}

impl AppState {
    pub async fn initialize() -> anyhow::Result<Arc<Self>> {
        let paths = Arc::new(AppPaths::new());
        let settings = Settings::load(&paths)?;
        let embeddings: Arc<dyn EmbeddingClient> =
            Arc::new(HttpEmbeddings::new(&settings.embedding));
        let completions: Arc<dyn CompletionClient> =
            Arc::new(HttpCompletions::new(&settings.completion));
        Self::assemble(paths, settings, embeddings, completions).await
    }

    /// Wire up the state with explicit provider clients. Integration tests
    /// use this seam to substitute fakes for the network providers.
    pub async fn assemble(
        paths: Arc<AppPaths>,
        settings: Settings,
        embeddings: Arc<dyn EmbeddingClient>,
        completions: Arc<dyn CompletionClient>,
    ) -> anyhow::Result<Arc<Self>> {
        let storage = Storage::new(&paths.db_path).await?;
        let index = Arc::new(VectorIndex::load(paths.vectors_path.clone()));

        let ingestor = Ingestor::new(
            storage.clone(),
            index.clone(),
            embeddings.clone(),
            settings.rag.chunk_size,
        );
        let chat = Arc::new(ChatEngine::new(
            storage.clone(),
            index.clone(),
            embeddings,
            completions,
            settings.rag.top_k,
        ));

        Ok(Arc::new(AppState {
            paths,
            settings,
            storage,
            index,
            ingestor,
            chat,
        }))
    }
}
