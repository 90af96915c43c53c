//! OpenAI chat-completions client
//!
//! Uses a long-lived reqwest::Client for connection pooling. Streaming
//! responses arrive as `data:`-framed SSE lines terminated by `[DONE]`;
//! the producer task forwards non-empty deltas into a bounded channel.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::{CompletionProvider, FragmentReceiver, FRAGMENT_CHANNEL_CAPACITY};
use crate::error::AssistantError;
use crate::models::Turn;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Reusable OpenAI client (connection-pooled)
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            base_url,
        }
    }

    async fn send_request(&self, request: &ChatRequest) -> crate::Result<reqwest::Response> {
        if self.api_key.is_empty() {
            return Err(AssistantError::Upstream(
                "OPENAI_API_KEY not configured".to_string(),
            ));
        }

        debug!(
            model = %request.model,
            message_count = request.messages.len(),
            stream = request.stream,
            "Sending OpenAI request"
        );

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!("OpenAI API request failed: {}", e);
                AssistantError::Upstream(format!("OpenAI API error: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("OpenAI API error response ({}): {}", status, error_text);
            return Err(AssistantError::Upstream(format!(
                "OpenAI API error {}: {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    async fn complete(&self, model: &str, turns: &[Turn]) -> crate::Result<String> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: turns.to_vec(),
            stream: false,
        };

        let response = self.send_request(&request).await?;

        let completion: ChatResponse = response.json().await.map_err(|e| {
            error!("Failed to parse OpenAI response: {}", e);
            AssistantError::Upstream(format!("OpenAI parse error: {}", e))
        })?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                AssistantError::Upstream("Empty response from OpenAI".to_string())
            })?;

        info!("OpenAI completion received ({} chars)", text.len());
        Ok(text)
    }

    async fn stream(&self, model: &str, turns: &[Turn]) -> crate::Result<FragmentReceiver> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: turns.to_vec(),
            stream: true,
        };

        let response = self.send_request(&request).await?;
        let (tx, rx) = mpsc::channel(FRAGMENT_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            // SSE lines can split across network chunks
            let mut buffer = String::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        error!("OpenAI stream interrupted: {}", e);
                        let _ = tx
                            .send(Err(AssistantError::Upstream(format!(
                                "OpenAI stream interrupted: {}",
                                e
                            ))))
                            .await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(newline) = buffer.find('\n') {
                    let line: String = buffer.drain(..=newline).collect();
                    match parse_sse_line(line.trim()) {
                        Some(SseEvent::Done) => return,
                        Some(SseEvent::Fragment(text)) => {
                            // Receiver dropped means the client disconnected
                            if tx.send(Ok(text)).await.is_err() {
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
}

/// One decoded server-sent event
enum SseEvent {
    Fragment(String),
    Done,
}

/// Decode a single SSE line: `data: {...}` or `data: [DONE]`.
///
/// Comment lines, blank lines, and deltas without content are skipped.
fn parse_sse_line(line: &str) -> Option<SseEvent> {
    if line.is_empty() || line.starts_with(':') {
        return None;
    }

    let data = line.strip_prefix("data:")?.trim_start();

    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }

    let chunk: StreamChunk = serde_json::from_str(data).ok()?;
    let content = chunk.choices.into_iter().next()?.delta.content?;
    if content.is_empty() {
        return None;
    }

    Some(SseEvent::Fragment(content))
}

// API request/response types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Turn>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}
