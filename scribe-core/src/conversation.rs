//! Message history and the streaming protocol for one assistant turn.
//!
//! A turn is claimed with [`ConversationLog::begin_turn`], which is the only
//! way to start one and refuses while another is in flight. The returned
//! [`TurnTicket`] names the assistant message that chunks are appended to and
//! carries the prior history to send. [`ConversationLog::finish_turn`] releases
//! the claim.

use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::{ChunkStream, PromptMessage};
use crate::now_secs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Strictly increasing within one log.
    pub id: u64,
    pub role: Role,
    pub text: String,
    pub created_at: i64,
}

impl Message {
    fn to_prompt(&self) -> PromptMessage {
        match self.role {
            Role::User => PromptMessage::user(self.text.clone()),
            Role::Assistant => PromptMessage::assistant(self.text.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TurnRejected {
    #[error("a reply is still streaming")]
    InFlight,
    #[error("message is empty")]
    EmptyMessage,
}

/// Handle for the turn that was just started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnTicket {
    /// Id of the (initially empty) assistant message.
    pub assistant_id: u64,
    /// Full history including the new user message, excluding the empty
    /// assistant placeholder.
    pub history: Vec<PromptMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    /// The caller stopped pulling. Not an error.
    Stopped,
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationLog {
    messages: Vec<Message>,
    in_flight: Option<u64>,
    last_error: Option<String>,
    pins: Vec<String>,
    next_id: u64,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Id of the assistant message currently being streamed into.
    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn pins(&self) -> &[String] {
        &self.pins
    }

    /// Starts a turn: appends the user message and an empty assistant
    /// message, marks the turn in flight and clears the last error.
    ///
    /// Rejected (log untouched) while a turn is in flight or when `text` is
    /// blank.
    pub fn begin_turn(&mut self, text: &str) -> Result<TurnTicket, TurnRejected> {
        if self.in_flight.is_some() {
            return Err(TurnRejected::InFlight);
        }
        if text.trim().is_empty() {
            return Err(TurnRejected::EmptyMessage);
        }
        self.push(Role::User, text.to_owned());
        let history = self.history();
        let assistant_id = self.push(Role::Assistant, String::new());
        self.in_flight = Some(assistant_id);
        self.last_error = None;
        Ok(TurnTicket { assistant_id, history })
    }

    /// Appends one streamed chunk. Ignored unless `id` is the in-flight
    /// assistant message.
    pub fn append_chunk(&mut self, id: u64, chunk: &str) -> bool {
        if self.in_flight != Some(id) {
            return false;
        }
        match self.messages.iter_mut().rev().find(|m| m.id == id) {
            Some(message) => {
                message.text.push_str(chunk);
                true
            }
            None => false,
        }
    }

    /// Ends the turn for `id`. Partial text is kept in every case; only a
    /// failure records `last_error`.
    pub fn finish_turn(&mut self, id: u64, outcome: TurnOutcome) -> bool {
        if self.in_flight != Some(id) {
            return false;
        }
        self.in_flight = None;
        match outcome {
            TurnOutcome::Completed => tracing::debug!(id, "assistant turn completed"),
            TurnOutcome::Stopped => tracing::info!(id, "assistant turn stopped by user"),
            TurnOutcome::Failed(reason) => {
                tracing::warn!(id, error = %reason, "assistant turn failed");
                self.last_error = Some(reason);
            }
        }
        true
    }

    /// Empties the history, the error and the pins. An in-flight turn is
    /// abandoned: its remaining chunks no longer match and are dropped.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.in_flight = None;
        self.last_error = None;
        self.pins.clear();
    }

    /// Pins `path` as reference context. Returns `false` if already pinned.
    pub fn pin(&mut self, path: &str) -> bool {
        if self.pins.iter().any(|p| p == path) {
            return false;
        }
        self.pins.push(path.to_owned());
        true
    }

    pub fn unpin(&mut self, path: &str) -> bool {
        let before = self.pins.len();
        self.pins.retain(|p| p != path);
        self.pins.len() != before
    }

    /// Returns `true` when `path` ends up pinned.
    pub fn toggle_pin(&mut self, path: &str) -> bool {
        if self.unpin(path) {
            false
        } else {
            self.pin(path)
        }
    }

    pub fn is_pinned(&self, path: &str) -> bool {
        self.pins.iter().any(|p| p == path)
    }

    /// All messages as prompt messages, in order.
    pub fn history(&self) -> Vec<PromptMessage> {
        self.messages.iter().map(Message::to_prompt).collect()
    }

    pub fn last_assistant_reply(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && !m.text.is_empty())
    }

    /// Replaces the log with persisted state. Ids continue after the largest
    /// restored id.
    pub fn restore(&mut self, messages: Vec<Message>, pins: Vec<String>) {
        self.next_id = messages.iter().map(|m| m.id + 1).max().unwrap_or(0);
        self.messages = messages;
        self.pins = pins;
        self.in_flight = None;
        self.last_error = None;
    }

    pub fn message(&self, id: u64) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    fn push(&mut self, role: Role, text: String) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.messages.push(Message { id, role, text, created_at: now_secs() });
        id
    }
}

/// Pulls `chunks` into the assistant message of `ticket` until the stream
/// ends, fails, or `stop` is raised, then finishes the turn.
///
/// `stop` is checked before every pull; once it is set the stream is dropped
/// without being polled again.
pub async fn drive_turn(
    log: &mut ConversationLog,
    ticket: &TurnTicket,
    mut chunks: ChunkStream,
    stop: &AtomicBool,
) -> TurnOutcome {
    let outcome = loop {
        if stop.load(Ordering::Relaxed) {
            break TurnOutcome::Stopped;
        }
        match chunks.next().await {
            Some(Ok(chunk)) => {
                log.append_chunk(ticket.assistant_id, &chunk);
            }
            Some(Err(err)) => break TurnOutcome::Failed(err.to_string()),
            None => break TurnOutcome::Completed,
        }
    };
    log.finish_turn(ticket.assistant_id, outcome.clone());
    outcome
}
