//! Configuration and settings management.
//!
//! This module provides application settings types and persistence.
//! Settings are stored in the user's config directory as JSON.

mod settings;

pub use settings::{
    api_key, api_key_with, AssistantSettings, ConfigError, IndexSettings, PollSettings, Settings,
    API_KEY_VAR, ASSISTANT_ID_VAR, LEGACY_API_KEY_VAR,
};
