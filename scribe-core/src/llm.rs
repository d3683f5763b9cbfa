//! Language-model capability.
//!
//! A prompt is a flat list of role-tagged messages. Streaming yields a
//! finite, non-restartable sequence of text chunks; consumers cancel by
//! dropping the stream.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: PromptRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: PromptRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: PromptRole::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prompt {
    pub messages: Vec<PromptMessage>,
}

impl Prompt {
    pub fn new(messages: Vec<PromptMessage>) -> Self {
        Self { messages }
    }
}

/// The fields a structured completion must return, all of them strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseShape {
    pub fields: Vec<&'static str>,
}

/// Lazily produced text chunks of one assistant reply.
pub type ChunkStream = BoxStream<'static, Result<String, LlmError>>;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Starts a streamed reply. Errors before the first chunk are returned
    /// directly; later ones arrive as an `Err` item, after which the stream
    /// ends.
    async fn stream(&self, prompt: Prompt) -> Result<ChunkStream, LlmError>;

    /// Requests a single structured reply shaped like `shape`. Returns the
    /// raw JSON text, or `None` when the model produced no content.
    async fn complete(&self, prompt: Prompt, shape: &ResponseShape) -> Result<Option<String>, LlmError>;
}
