//! Admin plugin — commander-level control commands.
//!
//! Reaches into the responder through the registry escape hatch to reset
//! histories and switch personas. Commands are plain chat messages from a
//! commander, prefixed with `!`.

use std::any::Any;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::context::BotContext;
use crate::error::PluginError;
use crate::message::{MessageKind, MessageRecord};
use crate::plugins::{Plugin, RegistryView, ResponderPlugin};
use crate::surface::AutomationSurface;

const HELP_TEXT: &str = "Commands:\n\
    !help — this text\n\
    !reset — forget our conversation so far\n\
    !persona — show your current persona\n\
    !persona <name> — switch persona (this also resets the conversation)";

pub struct AdminPlugin {
    surface: Arc<dyn AutomationSurface>,
    ctx: Arc<BotContext>,
    responder: OnceLock<Arc<ResponderPlugin>>,
}

impl AdminPlugin {
    pub fn new(surface: Arc<dyn AutomationSurface>, ctx: Arc<BotContext>) -> Arc<Self> {
        Arc::new(Self {
            surface,
            ctx,
            responder: OnceLock::new(),
        })
    }

    fn is_command(content: &str) -> bool {
        let content = content.trim();
        content == "!help"
            || content == "!reset"
            || content == "!persona"
            || content.starts_with("!persona ")
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
                name: "admin".to_string(),
                source,
            })
    }
}

#[async_trait]
impl Plugin for AdminPlugin {
    fn name(&self) -> &str {
        "admin"
    }

    fn bind(&self, registry: &RegistryView) {
        match registry.get_as::<ResponderPlugin>("responder") {
            Some(responder) => {
                let _ = self.responder.set(responder);
            }
            None => warn!("Responder plugin not found; admin commands degraded"),
        }
    }

    async fn init(&self) -> Result<(), PluginError> {
        info!(commanders = ?self.ctx.commanders(), "Admin plugin ready");
        Ok(())
    }

    fn claims(&self, record: &MessageRecord) -> bool {
        record.kind == MessageKind::Text
            && self.ctx.is_commander(&record.sender)
            && Self::is_command(&record.content)
    }

    async fn handle(&self, record: &MessageRecord) -> Result<(), PluginError> {
        let content = record.content.trim();
        let sender = &record.sender;

        if content == "!help" {
            return self.reply(record, HELP_TEXT).await;
        }

        let Some(responder) = self.responder.get() else {
            return self.reply(record, "The responder plugin is not available.").await;
        };

        if content == "!reset" {
            responder.reset(sender);
            return self.reply(record, "Done, I've forgotten our conversation.").await;
        }

        if content == "!persona" {
            let persona = responder.persona_of(sender);
            return self.reply(record, &format!("Your current persona: {persona}")).await;
        }

        if let Some(wanted) = content.strip_prefix("!persona ") {
            let wanted = wanted.trim();
            if responder.set_persona(sender, wanted) {
                return self.reply(record, &format!("Switched to persona: {wanted}")).await;
            }
            let available = responder.persona_names().join(", ");
            return self
                .reply(record, &format!("Unknown persona. Available: {available}"))
                .await;
        }

        // claims() and handle() agree on the command set; anything else
        // would be a claim we never made.
        Ok(())
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
