//! Network adapters for the capabilities `scribe-core` depends on: the GitHub
//! contents API as a [`RepoStore`](scribe_core::remote::RepoStore) and an
//! OpenAI-compatible chat-completions endpoint as a
//! [`LanguageModel`](scribe_core::llm::LanguageModel).

pub mod github;
pub mod openai;

pub use github::GitHubClient;
pub use openai::OpenAiClient;

/// Sent on every request; GitHub rejects requests without a user agent.
pub const USER_AGENT: &str = concat!("scribe/", env!("CARGO_PKG_VERSION"));
