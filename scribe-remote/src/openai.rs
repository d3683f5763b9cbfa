//! OpenAI-compatible chat-completions adapter.
//!
//! Streaming replies arrive as server-sent events. [`SseDecoder`] buffers raw
//! bytes and only interprets complete lines, so network chunk boundaries may
//! fall anywhere, including inside a multi-byte character.

use std::collections::VecDeque;
use std::fmt::Display;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use serde_json::{json, Value};

use scribe_core::config::ModelConfig;
use scribe_core::llm::{ChunkStream, LanguageModel, Prompt, ResponseShape};
use scribe_core::LlmError;

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    patch_temperature: f32,
    max_tokens: u32,
}

impl OpenAiClient {
    /// Builds a client. A missing key is not an error here; every request
    /// then fails with [`LlmError::NotConfigured`].
    pub fn new(settings: &ModelConfig, api_key: Option<String>) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .build()
            .map_err(|e| LlmError::transport(None, e.to_string()))?;
        Ok(Self {
            http,
            endpoint: settings.endpoint.clone(),
            model: settings.name.clone(),
            api_key,
            temperature: settings.temperature,
            patch_temperature: settings.patch_temperature,
            max_tokens: settings.max_tokens,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn post(&self, payload: &Value) -> Result<reqwest::Response, LlmError> {
        let key = self.api_key.as_deref().ok_or(LlmError::NotConfigured)?;
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(key)
            .json(payload)
            .send()
            .await
            .map_err(|e| LlmError::transport(e.status().map(|s| s.as_u16()), e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(api_error(status, &body))
    }
}

/// Uses `error.message` from the response body when present.
fn api_error(status: StatusCode, body: &str) -> LlmError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_owned());
    LlmError::transport(Some(status.as_u16()), format!("{message} ({})", status.as_u16()))
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn stream(&self, prompt: Prompt) -> Result<ChunkStream, LlmError> {
        let payload = json!({
            "model": self.model,
            "messages": prompt.messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": true,
        });
        tracing::debug!(model = %self.model, messages = prompt.messages.len(), "starting streamed completion");
        let response = self.post(&payload).await?;
        Ok(sse_chunks(response.bytes_stream()))
    }

    async fn complete(&self, prompt: Prompt, shape: &ResponseShape) -> Result<Option<String>, LlmError> {
        let payload = json!({
            "model": self.model,
            "messages": prompt.messages,
            "temperature": self.patch_temperature,
            "max_tokens": self.max_tokens,
            "response_format": { "type": "json_object" },
        });
        tracing::debug!(model = %self.model, fields = ?shape.fields, "requesting structured completion");
        let response = self.post(&payload).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| LlmError::transport(None, format!("unexpected completion body: {e}")))?;
        Ok(body
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_owned))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Delta(String),
    Done,
}

/// Incremental decoder for an SSE body carrying chat-completion deltas.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw bytes and returns the events of every line they completed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            events.extend(decode_line(&line));
        }
        events
    }

    /// Interprets whatever is left once the body has ended.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest).into_iter().collect()
    }
}

fn decode_line(raw: &[u8]) -> Option<SseEvent> {
    let line = match std::str::from_utf8(raw) {
        Ok(line) => line.trim(),
        Err(err) => {
            tracing::warn!(error = %err, "dropping stream line that is not UTF-8");
            return None;
        }
    };
    let data = line.strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }
    let value: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!(error = %err, "skipping unparseable stream event");
            return None;
        }
    };
    value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(|s| SseEvent::Delta(s.to_owned()))
}

struct SseState<S> {
    body: std::pin::Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

impl<S> SseState<S> {
    fn absorb(&mut self, events: Vec<SseEvent>) {
        for event in events {
            if self.finished {
                break;
            }
            match event {
                SseEvent::Delta(text) => self.pending.push_back(text),
                SseEvent::Done => self.finished = true,
            }
        }
    }
}

/// Turns a raw SSE byte stream into a stream of text chunks.
///
/// The sequence ends at `[DONE]` or when the body ends. A transport error
/// is yielded once and ends the sequence.
pub fn sse_chunks<S, B, E>(body: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = SseState {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };
    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(text) = state.pending.pop_front() {
                return Some((Ok(text), state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => {
                    let events = state.decoder.push(bytes.as_ref());
                    state.absorb(events);
                }
                Some(Err(err)) => {
                    state.finished = true;
                    state.pending.clear();
                    return Some((Err(LlmError::transport(None, format!("stream interrupted: {err}"))), state));
                }
                None => {
                    let events = state.decoder.finish();
                    state.absorb(events);
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}
