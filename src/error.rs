//! Error types for the bot core.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Completion error: {0}")]
    Completion(#[from] CompletionError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Automation-surface errors.
///
/// Read failures are transient: the poll loop logs them and moves on to the
/// next cycle. Send failures are surfaced to the plugin that attempted the
/// send.
#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("Failed to read conversation list: {0}")]
    ConversationList(String),

    #[error("Failed to read messages from {conversation}: {reason}")]
    MessageRead {
        conversation: String,
        reason: String,
    },

    #[error("Failed to send to {conversation}: {reason}")]
    SendFailed {
        conversation: String,
        reason: String,
    },

    #[error("Media file not found: {0}")]
    MediaNotFound(String),

    #[error("Surface unavailable: {0}")]
    Unavailable(String),
}

/// Plugin lifecycle and runtime errors.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("Duplicate plugin name: {0}")]
    DuplicateName(String),

    #[error("Plugin {name} failed to initialize: {reason}")]
    InitFailed { name: String, reason: String },

    #[error("Plugin {name} failed while handling a message: {reason}")]
    HandleFailed { name: String, reason: String },

    #[error("Surface error in plugin {name}: {source}")]
    Surface {
        name: String,
        #[source]
        source: SurfaceError,
    },
}

/// Completion-collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("Provider request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),

    #[error("Provider returned no choices")]
    EmptyResponse,

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for the bot core.
pub type Result<T> = std::result::Result<T, Error>;
