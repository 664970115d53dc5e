//! End-to-end API tests: real axum server over a TCP socket, fake model
//! providers behind the client traits.

use std::net::SocketAddr;
use std::sync::Arc;

use askbase::core::config::{AppPaths, Settings};
use askbase::core::errors::{CompletionError, EmbeddingError};
use askbase::llm::{ChatMessage, CompletionClient, EmbeddingClient};
use askbase::server::router::router;
use askbase::state::AppState;
use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Embeds any text to a fixed vector, so every chunk matches every query.
struct FakeEmbeddings;

#[async_trait]
impl EmbeddingClient for FakeEmbeddings {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(vec![1.0, 0.0, 0.0])
    }
}

struct FakeCompletions;

#[async_trait]
impl CompletionClient for FakeCompletions {
    async fn stream_chat(
        &self,
        _messages: Vec<ChatMessage>,
        _model: &str,
        _temperature: f64,
    ) -> Result<mpsc::Receiver<Result<String, CompletionError>>, CompletionError> {
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            for fragment in ["Our refund window ", "is 30 days."] {
                if tx.send(Ok(fragment.to_string())).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }

    async fn chat(
        &self,
        _messages: Vec<ChatMessage>,
        _model: &str,
        _temperature: f64,
    ) -> Result<String, CompletionError> {
        Ok("Our refund window is 30 days.".to_string())
    }
}

struct TestServer {
    _data_dir: TempDir,
    addr: SocketAddr,
    client: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        let data_dir = TempDir::new().expect("tempdir");
        let paths = Arc::new(AppPaths::with_data_dir(data_dir.path().to_path_buf()));
        let settings = Settings::default();

        let state = AppState::assemble(
            paths,
            settings,
            Arc::new(FakeEmbeddings),
            Arc::new(FakeCompletions),
        )
        .await
        .expect("state");

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.expect("serve");
        });

        Self {
            _data_dir: data_dir,
            addr,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

fn sse_frames(body: &str) -> Vec<Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .filter_map(|data| serde_json::from_str(data).ok())
        .collect()
}

#[tokio::test]
async fn ingest_chat_and_citation_round_trip() {
    let server = TestServer::start().await;

    // Ingest one document.
    let report: Value = server
        .client
        .post(server.url("/api/documents"))
        .json(&json!({
            "title": "Policy",
            "content": "Our refund window is 30 days.",
        }))
        .send()
        .await
        .expect("ingest")
        .json()
        .await
        .expect("report json");
    assert_eq!(report["chunks_total"], 1);
    assert_eq!(report["chunks_indexed"], 1);
    assert_eq!(report["chunks_failed"], 0);

    let documents: Vec<Value> = server
        .client
        .get(server.url("/api/documents"))
        .send()
        .await
        .expect("list")
        .json()
        .await
        .expect("documents json");
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0]["title"], "Policy");

    // Ask a question; read the SSE stream to completion.
    let body = server
        .client
        .post(server.url("/api/chat"))
        .json(&json!({"message": "What is your refund window?"}))
        .send()
        .await
        .expect("chat")
        .text()
        .await
        .expect("chat body");

    let frames = sse_frames(&body);
    assert!(frames.len() >= 2);

    let answer: String = frames
        .iter()
        .filter_map(|frame| frame["content"].as_str())
        .collect();
    assert_eq!(answer, "Our refund window is 30 days.");

    let last = frames.last().expect("terminal frame");
    assert_eq!(last["done"], true);
    let session_id = last["sessionId"].as_str().expect("session id").to_string();

    // Both turns were persisted with the citation.
    let conversations: Vec<Value> = server
        .client
        .get(server.url("/api/conversations"))
        .send()
        .await
        .expect("conversations")
        .json()
        .await
        .expect("conversations json");
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0]["session_id"], session_id.as_str());
    assert_eq!(conversations[0]["message_count"], 2);

    let conversation_id = conversations[0]["id"].as_str().expect("conversation id");
    let messages: Vec<Value> = server
        .client
        .get(server.url(&format!(
            "/api/conversations/{}/messages",
            conversation_id
        )))
        .send()
        .await
        .expect("messages")
        .json()
        .await
        .expect("messages json");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["citations"], json!([{"title": "Policy", "url": null}]));
}

#[tokio::test]
async fn chat_against_empty_knowledge_base_succeeds_without_citations() {
    let server = TestServer::start().await;

    let body = server
        .client
        .post(server.url("/api/chat"))
        .json(&json!({"message": "Anyone there?"}))
        .send()
        .await
        .expect("chat")
        .text()
        .await
        .expect("body");

    let frames = sse_frames(&body);
    let last = frames.last().expect("terminal frame");
    assert_eq!(last["done"], true);

    let conversations: Vec<Value> = server
        .client
        .get(server.url("/api/conversations"))
        .send()
        .await
        .expect("conversations")
        .json()
        .await
        .expect("json");
    let conversation_id = conversations[0]["id"].as_str().unwrap();
    let messages: Vec<Value> = server
        .client
        .get(server.url(&format!(
            "/api/conversations/{}/messages",
            conversation_id
        )))
        .send()
        .await
        .expect("messages")
        .json()
        .await
        .expect("json");
    assert_eq!(messages[1]["citations"], json!([]));
}

#[tokio::test]
async fn empty_message_is_a_bad_request() {
    let server = TestServer::start().await;

    let status = server
        .client
        .post(server.url("/api/chat"))
        .json(&json!({"message": "   "}))
        .send()
        .await
        .expect("chat")
        .status();
    assert_eq!(status, 400);
}

#[tokio::test]
async fn deleting_a_document_empties_the_index() {
    let server = TestServer::start().await;

    let report: Value = server
        .client
        .post(server.url("/api/documents"))
        .json(&json!({"title": "Doc", "content": "some words here"}))
        .send()
        .await
        .expect("ingest")
        .json()
        .await
        .expect("json");
    let document_id = report["document_id"].as_str().expect("document id");

    let stats: Value = server
        .client
        .get(server.url("/api/stats"))
        .send()
        .await
        .expect("stats")
        .json()
        .await
        .expect("json");
    assert_eq!(stats["indexedChunks"], 1);

    let deleted: Value = server
        .client
        .delete(server.url(&format!("/api/documents/{}", document_id)))
        .send()
        .await
        .expect("delete")
        .json()
        .await
        .expect("json");
    assert_eq!(deleted["success"], true);
    assert_eq!(deleted["removedChunks"], 1);

    let stats: Value = server
        .client
        .get(server.url("/api/stats"))
        .send()
        .await
        .expect("stats")
        .json()
        .await
        .expect("json");
    assert_eq!(stats["indexedChunks"], 0);
    assert_eq!(stats["documents"], 0);

    let missing = server
        .client
        .delete(server.url(&format!("/api/documents/{}", document_id)))
        .send()
        .await
        .expect("delete again")
        .status();
    assert_eq!(missing, 404);
}

#[tokio::test]
async fn chatbot_config_defaults_and_updates() {
    let server = TestServer::start().await;

    let chatbot: Value = server
        .client
        .get(server.url("/api/chatbot"))
        .send()
        .await
        .expect("get chatbot")
        .json()
        .await
        .expect("json");
    assert_eq!(chatbot["name"], "AI Assistant");

    let updated: Value = server
        .client
        .put(server.url("/api/chatbot"))
        .json(&json!({"temperature": 0.2, "system_prompt": "Be terse."}))
        .send()
        .await
        .expect("update")
        .json()
        .await
        .expect("json");
    assert_eq!(updated["temperature"], 0.2);
    assert_eq!(updated["system_prompt"], "Be terse.");
}
