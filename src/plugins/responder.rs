//! Responder plugin — answers chat messages with LLM completions.
//!
//! Claims meaningful text messages: every direct chat, and group messages
//! that @-mention the bot. Handling submits the user turn to the
//! completion pool, waits a bounded time for the reply, and sends either
//! the reply or an apologetic fallback. Group replies @-mention the
//! original sender back.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::PersonaSet;
use crate::error::PluginError;
use crate::llm::Turn;
use crate::message::{MessageKind, MessageRecord, preview};
use crate::plugins::Plugin;
use crate::pool::CompletionPool;
use crate::surface::AutomationSurface;

/// Sent when a completion fails or times out. Deliberately casual — this
/// goes to the end user, not an operator.
const FALLBACK_REPLY: &str = "Sorry, could you say that again?";

pub struct ResponderPlugin {
    surface: Arc<dyn AutomationSurface>,
    pool: Arc<CompletionPool>,
    personas: PersonaSet,
    /// Persona selected per sender; absent means the default.
    selected: Mutex<HashMap<String, String>>,
    self_name: String,
    collect_timeout: Duration,
}

impl ResponderPlugin {
    pub fn new(
        surface: Arc<dyn AutomationSurface>,
        pool: Arc<CompletionPool>,
        personas: PersonaSet,
        self_name: impl Into<String>,
        collect_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            surface,
            pool,
            personas,
            selected: Mutex::new(HashMap::new()),
            self_name: self_name.into(),
            collect_timeout,
        })
    }

    /// Forget one sender's conversation so the next exchange starts fresh.
    pub fn reset(&self, sender: &str) {
        self.pool.clear(sender);
        info!(sender, "Responder history reset");
    }

    pub fn persona_of(&self, sender: &str) -> String {
        self.selected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(sender)
            .cloned()
            .unwrap_or_else(|| self.personas.default_name().to_string())
    }

    /// Switch a sender's persona. Clears their history, since the old
    /// conversation was shaped by the old system prompt. Returns false for
    /// an unknown persona.
    pub fn set_persona(&self, sender: &str, persona: &str) -> bool {
        if !self.personas.contains(persona) {
            return false;
        }
        self.pool.clear(sender);
        self.selected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(sender.to_string(), persona.to_string());
        info!(sender, persona, "Persona switched");
        true
    }

    pub fn persona_names(&self) -> Vec<String> {
        self.personas.names().into_iter().map(str::to_string).collect()
    }

    fn mention_prefix(&self) -> String {
        format!("@{}", self.self_name)
    }

    /// Strip a leading @-mention of the bot from group messages.
    fn question_of(&self, record: &MessageRecord) -> String {
        if record.from_group() {
            if let Some(rest) = record.content.strip_prefix(&self.mention_prefix()) {
                return rest.trim_start().to_string();
            }
        }
        record.content.clone()
    }

    async fn reply(&self, record: &MessageRecord, text: &str) -> Result<(), PluginError> {
        let outgoing = if record.from_group() {
            format!("@{} {}", record.sender, text)
        } else {
            text.to_string()
        };
        self.surface
            .send_text(record.reply_target(), &outgoing)
            .await
            .map_err(|source| PluginError::Surface {
                name: "responder".to_string(),
                source,
            })
    }
}

#[async_trait]
impl Plugin for ResponderPlugin {
    fn name(&self) -> &str {
        "responder"
    }

    async fn init(&self) -> Result<(), PluginError> {
        info!(
            personas = ?self.personas.names(),
            default = %self.personas.default_name(),
            "Responder ready"
        );
        Ok(())
    }

    fn claims(&self, record: &MessageRecord) -> bool {
        if record.kind != MessageKind::Text || !record.is_meaningful {
            return false;
        }
        if record.sender == self.self_name {
            return false;
        }
        if record.from_group() {
            return record.content.starts_with(&self.mention_prefix());
        }
        true
    }

    async fn handle(&self, record: &MessageRecord) -> Result<(), PluginError> {
        let sender = &record.sender;
        let persona = self.persona_of(sender);
        let system_prompt = self.personas.prompt(&persona).map(str::to_string);
        let question = self.question_of(record);

        debug!(
            sender = %sender,
            persona = %persona,
            content = %preview(&question),
            "Answering message"
        );

        let id = self.pool.submit(sender, Turn::user(question), system_prompt);
        match self.pool.collect(id, self.collect_timeout).await {
            Some(text) => {
                self.pool.append_assistant(sender, &text);
                self.reply(record, &text).await
            }
            None => self.reply(record, FALLBACK_REPLY).await,
        }
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
