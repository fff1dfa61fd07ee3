//! Owner plugin — privileged operations for the bot's owner.
//!
//! Shutdown, commander roster management and media sends. Owner-only:
//! these commands change who can control the bot and when it runs.

use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::context::BotContext;
use crate::error::PluginError;
use crate::message::{MessageKind, MessageRecord};
use crate::plugins::Plugin;
use crate::surface::AutomationSurface;

pub struct OwnerPlugin {
    surface: Arc<dyn AutomationSurface>,
    ctx: Arc<BotContext>,
}

impl OwnerPlugin {
    pub fn new(surface: Arc<dyn AutomationSurface>, ctx: Arc<BotContext>) -> Arc<Self> {
        Arc::new(Self { surface, ctx })
    }

    fn is_command(content: &str) -> bool {
        let content = content.trim();
        content == "!stop"
            || content == "!admins"
            || content.starts_with("!promote ")
            || content.starts_with("!demote ")
            || content.starts_with("!sendfile ")
    }

    async fn reply(&self, record: &MessageRecord, text: &str) -> Result<(), PluginError> {
        self.surface
            .send_text(record.reply_target(), text)
            .await
            .map_err(|source| PluginError::Surface {
                name: "owner".to_string(),
                source,
            })
    }

    fn promote(&self, names: &str) -> String {
        if names.trim() == "all" {
            for name in self.ctx.roster() {
                self.ctx.add_commander(&name);
            }
            return "Promoted everyone on the roster.".to_string();
        }
        let mut already = Vec::new();
        for name in names.split_whitespace() {
            if !self.ctx.add_commander(name) {
                already.push(name.to_string());
            }
        }
        if already.is_empty() {
            "Done.".to_string()
        } else {
            format!("Done. Already commanders: {}", already.join(", "))
        }
    }

    fn demote(&self, names: &str) -> String {
        if names.trim() == "all" {
            for name in self.ctx.roster() {
                self.ctx.remove_commander(&name);
            }
            return "Demoted everyone except owners.".to_string();
        }
        let mut missing = Vec::new();
        for name in names.split_whitespace() {
            if !self.ctx.remove_commander(name) {
                missing.push(name.to_string());
            }
        }
        if missing.is_empty() {
            "Done.".to_string()
        } else {
            format!("Done. Not commanders (or owners): {}", missing.join(", "))
        }
    }
}

#[async_trait]
impl Plugin for OwnerPlugin {
    fn name(&self) -> &str {
        "owner"
    }

    async fn init(&self) -> Result<(), PluginError> {
        info!(owner = ?self.ctx.primary_owner(), "Owner plugin ready");
        Ok(())
    }

    fn claims(&self, record: &MessageRecord) -> bool {
        record.kind == MessageKind::Text
            && self.ctx.is_owner(&record.sender)
            && Self::is_command(&record.content)
    }

    async fn handle(&self, record: &MessageRecord) -> Result<(), PluginError> {
        let content = record.content.trim();

        if content == "!stop" {
            self.reply(record, "Bye for now.").await?;
            info!(sender = %record.sender, "Shutdown requested by owner");
            self.ctx.request_stop();
            return Ok(());
        }

        if content == "!admins" {
            let commanders = self.ctx.commanders();
            let listing = if commanders.is_empty() {
                "No commanders.".to_string()
            } else {
                format!("Commanders: {}", commanders.join(", "))
            };
            return self.reply(record, &listing).await;
        }

        if let Some(names) = content.strip_prefix("!promote ") {
            let summary = self.promote(names);
            return self.reply(record, &summary).await;
        }

        if let Some(names) = content.strip_prefix("!demote ") {
            let summary = self.demote(names);
            return self.reply(record, &summary).await;
        }

        if let Some(path) = content.strip_prefix("!sendfile ") {
            let path = Path::new(path.trim());
            // Direct chats send the file back to the owner; group commands
            // send it into the group.
            let target = record.reply_target();
            return match self.surface.send_media(target, path).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    warn!(path = %path.display(), "Media send failed: {e}");
                    self.reply(record, &format!("Couldn't send that file: {e}")).await
                }
            };
        }

        Ok(())
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::plugins::PluginRegistry;
    use crate::surface::testing::RecordingSurface;

    async fn setup() -> (PluginRegistry, Arc<RecordingSurface>, Arc<BotContext>) {
        let surface = Arc::new(RecordingSurface::default());
        let ctx = Arc::new(BotContext::new(
            "hihi",
            vec!["owner".to_string()],
            vec!["owner".to_string()],
        ));
        ctx.set_roster(vec!["alice".to_string(), "bob".to_string(), "owner".to_string()]);

        let owner = OwnerPlugin::new(
            Arc::clone(&surface) as Arc<dyn AutomationSurface>,
            Arc::clone(&ctx),
        );
        let registry = PluginRegistry::load(vec![owner as Arc<dyn Plugin>], &[])
            .await
            .unwrap();

        (registry, surface, ctx)
    }

    fn cmd(sender: &str, content: &str) -> MessageRecord {
        MessageRecord::text(sender, None, content)
    }

    #[tokio::test]
    async fn only_the_owner_is_heard() {
        let (registry, _, _) = setup().await;
        let owner = registry.view().get("owner").unwrap();

        assert!(owner.claims(&cmd("owner", "!stop")));
        assert!(!owner.claims(&cmd("alice", "!stop")));
        assert!(!owner.claims(&cmd("owner", "hello")));
    }

    #[tokio::test]
    async fn stop_sets_the_flag_after_goodbye() {
        let (registry, surface, ctx) = setup().await;
        assert!(!ctx.stop_requested());

        registry.dispatch(&cmd("owner", "!stop")).await;

        assert!(ctx.stop_requested());
        let sent = surface.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
    }

    #[tokio::test]
    async fn promote_and_demote_manage_the_roster() {
        let (registry, _, ctx) = setup().await;

        registry.dispatch(&cmd("owner", "!promote alice bob")).await;
        assert!(ctx.is_commander("alice"));
        assert!(ctx.is_commander("bob"));

        registry.dispatch(&cmd("owner", "!demote alice")).await;
        assert!(!ctx.is_commander("alice"));
        assert!(ctx.is_commander("bob"));

        registry.dispatch(&cmd("owner", "!demote all")).await;
        assert!(!ctx.is_commander("bob"));
        // Owners survive a demote-all.
        assert!(ctx.is_commander("owner"));
    }

    #[tokio::test]
    async fn promote_all_uses_the_roster() {
        let (registry, _, ctx) = setup().await;

        registry.dispatch(&cmd("owner", "!promote all")).await;
        assert!(ctx.is_commander("alice"));
        assert!(ctx.is_commander("bob"));
    }

    #[tokio::test]
    async fn sendfile_reports_missing_files() {
        let (registry, surface, _) = setup().await;

        registry
            .dispatch(&cmd("owner", "!sendfile /no/such/file.png"))
            .await;

        let sent = surface.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("Couldn't send that file"));
        assert!(surface.media.lock().unwrap().is_empty());
    }
}
