//! Completion collaborator boundary.
//!
//! The pool talks to whatever implements [`CompletionProvider`]; the
//! shipped implementation speaks the OpenAI-compatible chat-completions
//! protocol over HTTP.

mod openai;

pub use openai::OpenAiProvider;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::error::CompletionError;

/// Role of one conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged turn of a conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The external completion collaborator.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// One request/response cycle over an ordered history.
    async fn complete(&self, turns: &[Turn]) -> Result<String, CompletionError>;

    /// Model identifier, for logging.
    fn model_name(&self) -> &str;
}

/// Create the completion provider from configuration.
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn CompletionProvider>, CompletionError> {
    let provider = OpenAiProvider::new(config)?;
    tracing::info!(model = %config.model, "Completion provider ready");
    Ok(Arc::new(provider))
}
