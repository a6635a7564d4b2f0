//! Application settings and configuration types.
//!
//! Settings are persisted to `~/.config/mailsense/settings.json` (or the
//! platform equivalent). A missing file means defaults; `mailsense init`
//! writes them out for editing. Secrets never live
//! in the file: the API key comes from the environment, which may itself be
//! seeded from a `.env` file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assistant::{Backoff, ExponentialBackoff, FixedBackoff, DEFAULT_MAX_POLLS};
use crate::embedding::EmbeddingConfig;
use crate::generator::GeneratorConfig;

/// Primary API key variable.
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
/// Older spelling, still honoured.
pub const LEGACY_API_KEY_VAR: &str = "OpenAI_API_Key";
/// Overrides `assistant.assistant_id`.
pub const ASSISTANT_ID_VAR: &str = "MAILSENSE_ASSISTANT_ID";

/// Errors that can occur while reading or writing settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("No home directory to hold settings")]
    NoConfigDir,
}

/// Top-level application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Embedding model selection.
    pub embedding: EmbeddingConfig,
    /// Corpus and artifact locations.
    pub index: IndexSettings,
    /// Hosted assistant connection and polling.
    pub assistant: AssistantSettings,
    /// Synthetic corpus generation.
    pub generator: GeneratorConfig,
}

/// Where the corpus and its embedding artifact live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub corpus_dir: PathBuf,
    pub artifact: PathBuf,
    /// Hits handed to the assistant per search.
    pub top_k: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            corpus_dir: PathBuf::from("data"),
            artifact: PathBuf::from("embeddings.safetensors"),
            top_k: 5,
        }
    }
}

/// Hosted assistant configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantSettings {
    /// Assistant configured on the service with the `search_emails` tool.
    pub assistant_id: Option<String>,
    /// Custom API endpoint; OpenAI when unset.
    pub base_url: Option<String>,
    pub poll: PollSettings,
    pub max_polls: u32,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            assistant_id: None,
            base_url: None,
            poll: PollSettings::default(),
            max_polls: DEFAULT_MAX_POLLS,
        }
    }
}

/// Delay between run status polls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum PollSettings {
    Fixed { interval_ms: u64 },
    Exponential { base_ms: u64, factor: f64, max_ms: u64 },
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::Fixed { interval_ms: 1000 }
    }
}

impl PollSettings {
    pub fn backoff(&self) -> Box<dyn Backoff> {
        match *self {
            Self::Fixed { interval_ms } => Box::new(FixedBackoff(Duration::from_millis(interval_ms))),
            Self::Exponential {
                base_ms,
                factor,
                max_ms,
            } => Box::new(ExponentialBackoff {
                base: Duration::from_millis(base_ms),
                factor,
                max: Duration::from_millis(max_ms),
            }),
        }
    }
}

impl Settings {
    /// Default settings file location.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        ProjectDirs::from("", "", "mailsense")
            .map(|dirs| dirs.config_dir().join("settings.json"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Reads settings from `path`; defaults when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no settings file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes settings to `path` as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(io_err)
    }

    /// Applies overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    /// Applies overrides using `lookup` as the environment.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup(ASSISTANT_ID_VAR).filter(|v| !v.is_empty()) {
            self.assistant.assistant_id = Some(id);
        }
    }
}

/// The OpenAI API key from the process environment.
pub fn api_key() -> Option<String> {
    api_key_with(|name| std::env::var(name).ok())
}

/// The API key using `lookup` as the environment.
pub fn api_key_with(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    [API_KEY_VAR, LEGACY_API_KEY_VAR]
        .into_iter()
        .filter_map(|name| lookup(name))
        .find(|value| !value.is_empty())
}
