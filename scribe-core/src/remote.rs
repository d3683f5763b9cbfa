//! Repository read/write capability.
//!
//! The core never speaks HTTP. It sees the remote repository through two
//! object-safe traits, [`RepoReader`] and [`RepoWriter`], implemented by the
//! GitHub adapter in `scribe-remote` and by in-memory fakes in tests.
//!
//! File content crosses the wire in a binary-safe encoding (base64 over UTF-8
//! bytes). [`decode_text`] and [`encode_text`] are the only place that
//! encoding is handled, so every adapter gets lossless Unicode round-trips.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;
use crate::locator::RepoRef;

/// Whether a remote entry is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    /// Slash-separated path from the repository root.
    pub path: String,
    pub kind: EntryKind,
    /// Opaque revision token (a blob sha for GitHub).
    pub revision: String,
    pub size: Option<u64>,
}

/// Decoded file content plus the revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub text: String,
    pub revision: String,
}

/// Everything needed to write one file back under an optimistic precondition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub repo: RepoRef,
    pub path: String,
    pub text: String,
    /// The revision the text was based on. The write must fail with
    /// [`RemoteError::Conflict`] when the remote no longer holds it.
    pub expected_revision: String,
    pub message: String,
}

/// Result of a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    pub revision: String,
}

#[async_trait]
pub trait RepoReader: Send + Sync {
    /// Lists the immediate children of `path` (`""` is the repository root).
    async fn list(&self, repo: &RepoRef, path: &str) -> Result<Vec<RemoteEntry>, RemoteError>;

    /// Reads and decodes one file.
    async fn read(&self, repo: &RepoRef, path: &str) -> Result<RemoteFile, RemoteError>;
}

#[async_trait]
pub trait RepoWriter: Send + Sync {
    async fn write(&self, request: &WriteRequest) -> Result<WriteReceipt, RemoteError>;
}

/// A full read/write capability.
pub trait RepoStore: RepoReader + RepoWriter {}

impl<T: RepoReader + RepoWriter + ?Sized> RepoStore for T {}

/// Decodes a base64 payload into text.
///
/// Line breaks inside the payload are ignored (GitHub wraps its base64 at 60
/// columns). The bytes are interpreted as UTF-8; anything else is reported as
/// [`RemoteError::Decode`] rather than replaced with lossy characters.
pub fn decode_text(path: &str, encoded: &str) -> Result<String, RemoteError> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD.decode(compact.as_bytes()).map_err(|e| RemoteError::Decode {
        path: path.to_owned(),
        reason: format!("invalid base64: {e}"),
    })?;
    String::from_utf8(bytes).map_err(|e| RemoteError::Decode {
        path: path.to_owned(),
        reason: format!("content is not valid UTF-8: {e}"),
    })
}

/// Encodes text as base64 over its UTF-8 bytes. Inverse of [`decode_text`].
pub fn encode_text(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}
