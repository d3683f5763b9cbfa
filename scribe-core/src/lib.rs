//! Core engine for scribe.
//!
//! Everything that carries real semantics lives here: the repository locator,
//! the lazily expanded remote tree cache, the open-document session, the
//! conversation log with its streaming protocol, context assembly, and the
//! exact-match patch engine. Transports (GitHub, the language model) and the
//! terminal shell live in sibling crates and talk to this crate through the
//! capability traits in [`remote`] and [`llm`].

pub mod config;
pub mod context;
pub mod conversation;
pub mod db;
pub mod document;
pub mod error;
pub mod llm;
pub mod locator;
pub mod patch;
pub mod remote;
pub mod schema;
pub mod tree;

pub use error::{DocumentError, LlmError, PatchError, RemoteError};
pub use locator::{parse_repo_ref, RepoRef};

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current Unix timestamp in seconds.
pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
