//! User configuration loaded from `config.toml`.
//!
//! Every key is optional. A missing file yields the defaults; a file that
//! cannot be read or parsed is a soft failure reported through `tracing`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub theme: String,
    /// Repository opened at startup when none is given on the command line.
    pub repo: Option<String>,
    /// Directory holding the log file and the conversation database.
    pub data_dir: PathBuf,
    pub github: GitHubConfig,
    pub model: ModelConfig,
    pub context: ContextConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            theme: "catppuccin-mocha".to_owned(),
            repo: None,
            data_dir: PathBuf::from(".scribe"),
            github: GitHubConfig::default(),
            model: ModelConfig::default(),
            context: ContextConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_base: String,
    /// Name of the environment variable holding the access token.
    pub token_env: String,
    /// `{name}` and `{path}` are substituted.
    pub commit_message: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_owned(),
            token_env: "GITHUB_TOKEN".to_owned(),
            commit_message: crate::document::DEFAULT_COMMIT_TEMPLATE.to_owned(),
        }
    }
}

impl GitHubConfig {
    pub fn token(&self) -> Option<String> {
        env_value(&self.token_env)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub endpoint: String,
    pub name: String,
    pub api_key_env: String,
    pub temperature: f32,
    pub patch_temperature: f32,
    pub max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_owned(),
            name: "gpt-4.1-nano".to_owned(),
            api_key_env: "OPENAI_API_KEY".to_owned(),
            temperature: 0.7,
            patch_temperature: 0.3,
            max_tokens: 2000,
        }
    }
}

impl ModelConfig {
    pub fn api_key(&self) -> Option<String> {
        env_value(&self.api_key_env)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Upper bound, in characters, on the file content sent with a turn.
    pub max_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { max_chars: 120_000 }
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Returns the path to the scribe config file.
///
/// Prefers `$XDG_CONFIG_HOME/scribe/config.toml`; falls back to
/// `~/.config/scribe/config.toml` when the env var is absent.
pub fn config_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
        .unwrap_or_else(|| PathBuf::from(".config"));
    base.join("scribe").join("config.toml")
}

/// Reads and parses the config file at `path`.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_owned(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.to_owned(), source })
}

/// Loads the user's config, falling back to defaults on any failure.
///
/// The returned message (if any) describes a file that exists but could not
/// be used; callers show it once logging is up.
pub fn load_config() -> (Config, Option<String>) {
    let path = config_path();
    if !path.exists() {
        return (Config::default(), None);
    }
    match load_from(&path) {
        Ok(config) => (config, None),
        Err(err) => (Config::default(), Some(err.to_string())),
    }
}
