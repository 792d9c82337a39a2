//! Minimal client for a local Ollama-compatible chat endpoint (`POST /api/chat`).
//!
//! Replies arrive either as a single `{ "message": { "content": ... } }` object
//! or as NDJSON lines when streaming; both are folded into one string.

use crate::config::LlmConfig;
use crate::http_client::error_from_response;
use crate::BizError;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<&'a serde_json::Value>,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Clone, Debug)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("reqwest client build should not fail");
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            timeout,
            client,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(&config.base_url, config.model.clone(), config.timeout)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn chat_request(
        &self,
        messages: &[ChatMessage],
        options: Option<&serde_json::Value>,
        stream: bool,
    ) -> reqwest::RequestBuilder {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages,
            stream,
            options,
        };
        self.client.post(url).timeout(self.timeout).json(&body)
    }

    /// Non-streaming chat call. Some servers stream regardless of the flag,
    /// so the body is parsed as a single object first and as NDJSON otherwise.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        options: Option<&serde_json::Value>,
    ) -> Result<String, BizError> {
        let resp = self.chat_request(messages, options, false).send().await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        let text = resp.text().await?;
        collect_chat_content(&text)
    }

    /// Streaming chat call; accumulates `message.content` of every NDJSON
    /// line until a chunk reports `done`.
    pub async fn chat_streamed(
        &self,
        messages: &[ChatMessage],
        options: Option<&serde_json::Value>,
    ) -> Result<String, BizError> {
        let resp = self.chat_request(messages, options, true).send().await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let mut stream = resp.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();
        let mut content = String::new();
        while let Some(chunk) = stream.next().await {
            pending.extend_from_slice(&chunk?);
            while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                if append_chunk(&line, &mut content)? {
                    return Ok(content);
                }
            }
        }
        if !pending.is_empty() {
            append_chunk(&pending, &mut content)?;
        }
        Ok(content)
    }
}

/// Parse one NDJSON line into `content`; returns whether the stream is done.
fn append_chunk(line: &[u8], content: &mut String) -> Result<bool, BizError> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return Ok(false);
    }
    let chunk: ChatChunk = serde_json::from_str(line)
        .map_err(|e| BizError::Decode(format!("chat chunk: {e}")))?;
    if let Some(msg) = chunk.message {
        content.push_str(&msg.content);
    }
    Ok(chunk.done)
}

/// Fold a chat reply body (single object or NDJSON) into its text content.
pub fn collect_chat_content(body: &str) -> Result<String, BizError> {
    if let Ok(chunk) = serde_json::from_str::<ChatChunk>(body.trim()) {
        return Ok(chunk.message.map(|m| m.content).unwrap_or_default());
    }
    let mut content = String::new();
    for line in body.lines() {
        if append_chunk(line.as_bytes(), &mut content)? {
            break;
        }
    }
    Ok(content)
}

/// Extract the JSON object spanning the first `{` to the last `}` of a
/// free-text model reply.
pub fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<serde_json::Value>(&text[start..=end])
        .ok()
        .filter(|v| v.is_object())
}
