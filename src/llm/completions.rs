//! Completion provider client.
//!
//! Talks to an OpenRouter-style `/chat/completions` endpoint. Streaming
//! responses arrive as newline-delimited `data: <json>` frames ending with a
//! `[DONE]` sentinel; each frame carries an incremental content delta. The
//! stream is forwarded through a bounded channel: the consumer pulls, the
//! producer task suspends between upstream reads, and dropping the receiver
//! cancels the upstream request.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::core::config::settings::CompletionSettings;
use crate::core::errors::CompletionError;
use crate::llm::types::ChatMessage;

/// Streams or blocks on chat completions from the configured model.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Start a streaming completion. Each received item is one text fragment;
    /// an `Err` item terminates the stream. Fragments already received are
    /// never retracted.
    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        temperature: f64,
    ) -> Result<mpsc::Receiver<Result<String, CompletionError>>, CompletionError>;

    /// Non-streaming variant: blocks until the full response is available.
    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        temperature: f64,
    ) -> Result<String, CompletionError>;
}

#[derive(Clone)]
pub struct HttpCompletions {
    base_url: String,
    api_key: String,
    referer: String,
    app_title: String,
    idle_timeout: Duration,
    client: Client,
}

impl HttpCompletions {
    pub fn new(settings: &CompletionSettings) -> Self {
        Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            referer: settings.referer.clone(),
            app_title: settings.app_title.clone(),
            idle_timeout: Duration::from_secs(settings.idle_timeout_secs.max(1)),
            client: Client::new(),
        }
    }

    fn request(
        &self,
        messages: &[ChatMessage],
        model: &str,
        temperature: f64,
        stream: bool,
    ) -> reqwest::RequestBuilder {
        let url = format!("{}/chat/completions", self.base_url);
        self.client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.app_title)
            .json(&CompletionRequest {
                model,
                messages,
                temperature,
                stream,
            })
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct StreamFrame {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

enum SseEvent {
    Delta(String),
    Done,
}

/// Parse one SSE line. Non-`data:` lines, malformed JSON, and empty deltas
/// are skipped rather than treated as errors, matching provider behavior of
/// interleaving keep-alives and role-only frames.
fn parse_sse_line(line: &str) -> Option<SseEvent> {
    let data = line.trim().strip_prefix("data: ")?;

    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }

    let frame: StreamFrame = serde_json::from_str(data).ok()?;
    let content = frame.choices.into_iter().next()?.delta.content?;
    if content.is_empty() {
        None
    } else {
        Some(SseEvent::Delta(content))
    }
}

#[async_trait]
impl CompletionClient for HttpCompletions {
    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        temperature: f64,
    ) -> Result<mpsc::Receiver<Result<String, CompletionError>>, CompletionError> {
        let res = self
            .request(&messages, model, temperature, true)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let (tx, rx) = mpsc::channel(32);
        let idle_timeout = self.idle_timeout;
        let mut byte_stream = res.bytes_stream();

        tokio::spawn(async move {
            // Network chunks can split an SSE line anywhere, so partial lines
            // carry over between reads.
            let mut buffer = String::new();

            loop {
                let item = match tokio::time::timeout(idle_timeout, byte_stream.next()).await {
                    Ok(item) => item,
                    Err(_) => {
                        let _ = tx
                            .send(Err(CompletionError::IdleTimeout(idle_timeout.as_secs())))
                            .await;
                        return;
                    }
                };

                let bytes = match item {
                    Some(Ok(bytes)) => bytes,
                    Some(Err(err)) => {
                        let _ = tx.send(Err(CompletionError::Stream(err.to_string()))).await;
                        return;
                    }
                    // Upstream closed without [DONE]; whatever was forwarded
                    // stands.
                    None => return,
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(pos) = buffer.find('\n') {
                    let line: String = buffer.drain(..=pos).collect();
                    match parse_sse_line(&line) {
                        Some(SseEvent::Done) => return,
                        Some(SseEvent::Delta(content)) => {
                            if tx.send(Ok(content)).await.is_err() {
                                // Consumer hung up; dropping the stream aborts
                                // the upstream request.
                                return;
                            }
                        }
                        None => {}
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        temperature: f64,
    ) -> Result<String, CompletionError> {
        let res = self
            .request(&messages, model, temperature, false)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let payload: CompletionResponse = res
            .json()
            .await
            .map_err(|err| CompletionError::Stream(err.to_string()))?;

        payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| CompletionError::Stream("empty choices array".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta_line(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":{}}}}}]}}",
            serde_json::to_string(content).unwrap()
        )
    }

    #[test]
    fn content_delta_is_extracted() {
        match parse_sse_line(&delta_line("Hello")) {
            Some(SseEvent::Delta(content)) => assert_eq!(content, "Hello"),
            _ => panic!("expected a delta"),
        }
    }

    #[test]
    fn done_sentinel_is_recognized() {
        assert!(matches!(parse_sse_line("data: [DONE]"), Some(SseEvent::Done)));
        assert!(matches!(
            parse_sse_line("data: [DONE]\r"),
            Some(SseEvent::Done)
        ));
    }

    #[test]
    fn noise_lines_are_skipped() {
        assert!(parse_sse_line("").is_none());
        assert!(parse_sse_line(": keep-alive").is_none());
        assert!(parse_sse_line("event: ping").is_none());
        assert!(parse_sse_line("data: {not json").is_none());
        assert!(parse_sse_line(&delta_line("")).is_none());
    }

    #[test]
    fn role_only_frame_is_skipped() {
        let line = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert!(parse_sse_line(line).is_none());
    }
}
