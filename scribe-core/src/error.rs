//! Error taxonomy shared by the core components and the transport adapters.

use thiserror::Error;

/// Failures reported by the repository read/write capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Network failure or a non-2xx response. `status` is `None` when the
    /// request never produced an HTTP response.
    #[error("remote request failed: {message}")]
    Transport { status: Option<u16>, message: String },

    /// The write precondition did not hold: the file changed remotely since
    /// the revision we hold was fetched.
    #[error("{path} was changed on the remote since it was loaded")]
    Conflict { path: String },

    /// The binary-safe payload could not be turned back into text.
    #[error("could not decode {path}: {reason}")]
    Decode { path: String, reason: String },
}

impl RemoteError {
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        RemoteError::Transport { status, message: message.into() }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, RemoteError::Conflict { .. })
    }
}

/// Failures reported by the language-model capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    #[error("language model request failed: {message}")]
    Transport { status: Option<u16>, message: String },

    /// No API key or endpoint is available.
    #[error("no language model is configured")]
    NotConfigured,
}

impl LlmError {
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        LlmError::Transport { status, message: message.into() }
    }
}

/// Why an exact-match patch could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    /// The find text does not occur in the document.
    #[error("the text to replace was not found in the document")]
    NotFound,

    /// Applying the patch would leave the document unchanged.
    #[error("the suggested change is identical to the current text")]
    NoOp,
}

/// Failures from user-initiated document operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    /// Another load or save is still in flight.
    #[error("a document operation is already in progress")]
    Busy,

    /// The document never finished loading, so there is no revision to write
    /// against. Saving it would overwrite the remote blindly.
    #[error("{path} was not loaded successfully; refusing to write to it")]
    NotLoaded { path: String },

    /// No document is open.
    #[error("no document is open")]
    NoDocument,
}
