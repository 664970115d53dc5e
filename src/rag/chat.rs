//! Retrieval-augmented chat orchestration.
//!
//! One call = one grounded turn: persist the user message, embed it, retrieve
//! the most similar chunks, prompt the model with them, stream the answer
//! back, then persist the assistant message with its citations. Turns are
//! stateless with respect to dialogue history: each question is grounded
//! independently and prior turns are not replayed into the prompt.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, CompletionClient, EmbeddingClient};
use crate::rag::index::VectorIndex;
use crate::storage::Storage;

/// Where a turn is in its lifecycle; carried on logs and failure frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatStage {
    Received,
    EmbeddingQuery,
    Retrieving,
    Generating,
    Persisting,
    Done,
}

impl fmt::Display for ChatStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChatStage::Received => "received",
            ChatStage::EmbeddingQuery => "embedding_query",
            ChatStage::Retrieving => "retrieving",
            ChatStage::Generating => "generating",
            ChatStage::Persisting => "persisting",
            ChatStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// A reference to the source that grounded part of an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    pub title: String,
    pub url: Option<String>,
}

/// One frame of a streamed chat turn, as exposed to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ChatFrame {
    Content {
        content: String,
    },
    Done {
        done: bool,
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Error {
        error: String,
    },
}

impl ChatFrame {
    fn done(session_id: String) -> Self {
        ChatFrame::Done {
            done: true,
            session_id,
        }
    }
}

struct TurnFailure {
    stage: ChatStage,
    error: ApiError,
}

fn at<E: Into<ApiError>>(stage: ChatStage) -> impl FnOnce(E) -> TurnFailure {
    move |error| TurnFailure {
        stage,
        error: error.into(),
    }
}

pub struct ChatEngine {
    storage: Storage,
    index: Arc<VectorIndex>,
    embeddings: Arc<dyn EmbeddingClient>,
    completions: Arc<dyn CompletionClient>,
    top_k: usize,
}

impl ChatEngine {
    pub fn new(
        storage: Storage,
        index: Arc<VectorIndex>,
        embeddings: Arc<dyn EmbeddingClient>,
        completions: Arc<dyn CompletionClient>,
        top_k: usize,
    ) -> Self {
        Self {
            storage,
            index,
            embeddings,
            completions,
            top_k,
        }
    }

    /// Run one chat turn, returning the frame stream. The session id is
    /// generated when absent and echoed back on the terminal frame so the
    /// caller can continue the conversation.
    ///
    /// Validation failures surface synchronously; everything after that
    /// arrives as frames. Dropping the receiver cancels the turn, in which
    /// case no assistant message is persisted.
    pub fn respond(
        self: &Arc<Self>,
        message: String,
        session_id: Option<String>,
        visitor_ip: Option<String>,
    ) -> Result<mpsc::Receiver<ChatFrame>, ApiError> {
        if message.trim().is_empty() {
            return Err(ApiError::BadRequest(
                "message must not be empty".to_string(),
            ));
        }

        let session_id = session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let (tx, rx) = mpsc::channel(32);
        let engine = Arc::clone(self);

        tokio::spawn(async move {
            if let Err(failure) = engine
                .run_turn(&message, &session_id, visitor_ip.as_deref(), &tx)
                .await
            {
                tracing::error!(
                    "Chat turn failed during {}: {}",
                    failure.stage,
                    failure.error
                );
                let _ = tx
                    .send(ChatFrame::Error {
                        error: failure.error.to_string(),
                    })
                    .await;
            }
        });

        Ok(rx)
    }

    async fn run_turn(
        &self,
        message: &str,
        session_id: &str,
        visitor_ip: Option<&str>,
        tx: &mpsc::Sender<ChatFrame>,
    ) -> Result<(), TurnFailure> {
        let chatbot = self
            .storage
            .get_chatbot()
            .await
            .map_err(at(ChatStage::Received))?;
        let conversation = self
            .storage
            .get_or_create_conversation(session_id, visitor_ip)
            .await
            .map_err(at(ChatStage::Received))?;
        self.storage
            .add_message(&conversation.id, "user", message, None)
            .await
            .map_err(at(ChatStage::Received))?;

        let query_vector = self
            .embeddings
            .embed(message)
            .await
            .map_err(at(ChatStage::EmbeddingQuery))?;

        let hits = self
            .index
            .search(&query_vector, self.top_k)
            .await
            .map_err(at(ChatStage::Retrieving))?;

        // Resolve citations in retrieval order. A chunk whose document was
        // deleted since indexing gets a placeholder instead of failing the
        // turn.
        let mut citations = Vec::with_capacity(hits.len());
        let mut context_blocks = Vec::with_capacity(hits.len());
        for hit in &hits {
            let document = self
                .storage
                .get_document(&hit.record.document_id)
                .await
                .map_err(at(ChatStage::Retrieving))?;

            let (title, url) = match document {
                Some(doc) => (doc.title, doc.source_url),
                None => ("Unknown".to_string(), None),
            };

            context_blocks.push(format!("[{}] {}", title, hit.record.chunk_text));
            citations.push(Citation { title, url });
        }
        let context = context_blocks.join("\n\n");

        tracing::debug!(
            "Retrieved {} chunks for session {} (top_k {})",
            hits.len(),
            session_id,
            self.top_k
        );

        let messages = vec![
            ChatMessage::system(format!(
                "{}\n\nContext from knowledge base:\n{}",
                chatbot.system_prompt, context
            )),
            ChatMessage::user(message),
        ];

        let mut stream = self
            .completions
            .stream_chat(messages, &chatbot.llm_model, chatbot.temperature)
            .await
            .map_err(at(ChatStage::Generating))?;

        let mut answer = String::new();
        while let Some(item) = stream.recv().await {
            let fragment = item.map_err(at(ChatStage::Generating))?;
            answer.push_str(&fragment);
            if tx
                .send(ChatFrame::Content { content: fragment })
                .await
                .is_err()
            {
                // Caller hung up; abandon the turn without persisting a
                // partial answer.
                tracing::debug!("Chat caller disconnected, session {}", session_id);
                return Ok(());
            }
        }

        let citations_json = json!(citations);
        self.storage
            .add_message(&conversation.id, "assistant", &answer, Some(&citations_json))
            .await
            .map_err(at(ChatStage::Persisting))?;

        let _ = tx.send(ChatFrame::done(session_id.to_string())).await;
        tracing::info!(
            "Chat turn complete for session {} ({} chars, {} citations)",
            session_id,
            answer.len(),
            citations.len()
        );
        Ok(())
    }
}
