//! Bot assembly — wires the poller, event queue and dispatch loop.
//!
//! Two loops run for the process lifetime: the spawned poll loop feeds the
//! detector, and the dispatch loop (this task) drains the event queue and
//! runs plugins one message at a time. Both check the context stop flag at
//! iteration boundaries; shutdown joins the poller with a bounded wait.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cache::ConversationCache;
use crate::config::BotConfig;
use crate::context::BotContext;
use crate::detector::{NewMessageDetector, event_queue, latest_record, next_event, spawn_poller};
use crate::error::Result;
use crate::message::preview;
use crate::plugins::{DispatchOutcome, PluginRegistry};
use crate::surface::AutomationSurface;

pub struct Bot {
    config: BotConfig,
    ctx: Arc<BotContext>,
    surface: Arc<dyn AutomationSurface>,
    registry: PluginRegistry,
    cache: Arc<Mutex<ConversationCache>>,
}

impl Bot {
    pub fn new(
        config: BotConfig,
        ctx: Arc<BotContext>,
        surface: Arc<dyn AutomationSurface>,
        registry: PluginRegistry,
    ) -> Self {
        let cache = Arc::new(Mutex::new(ConversationCache::new(config.memory_len)));
        Self {
            config,
            ctx,
            surface,
            registry,
            cache,
        }
    }

    /// Run until the context stop flag is raised.
    pub async fn run(self) -> Result<()> {
        match self.surface.contacts().await {
            Ok(names) => {
                info!(contacts = names.len(), "Roster loaded");
                self.ctx.set_roster(names);
            }
            Err(e) => warn!("Could not read contacts: {e}"),
        }

        let (events_tx, mut events_rx) = event_queue();
        let detector = NewMessageDetector::new(
            Arc::clone(&self.cache),
            events_tx,
            self.ctx.self_name(),
        );
        let (poller, poller_shutdown) = spawn_poller(
            Arc::clone(&self.surface),
            detector,
            Arc::clone(&self.ctx),
            self.config.clone(),
        );

        info!(plugins = self.registry.len(), "Bot started");

        loop {
            if self.ctx.stop_requested() {
                break;
            }
            match next_event(&mut events_rx, self.config.queue_wait).await {
                Some(Some(conversation)) => self.handle_event(&conversation).await,
                Some(None) => {
                    warn!("Event queue closed");
                    break;
                }
                // Bounded wait elapsed; loop back and re-check the stop flag.
                None => continue,
            }
        }

        poller_shutdown.store(true, Ordering::Relaxed);
        let grace = self.config.poll_interval * 2 + Duration::from_secs(1);
        if tokio::time::timeout(grace, poller).await.is_err() {
            warn!("Poller did not stop within {grace:?}, abandoning it");
        }

        info!("Bot stopped");
        Ok(())
    }

    /// Dispatch the newest cached record of an enqueued conversation.
    async fn handle_event(&self, conversation: &str) {
        let Some(record) = latest_record(&self.cache, conversation) else {
            debug!(conversation, "Event without a cached record, skipping");
            return;
        };
        if self.ctx.is_self(&record.sender) {
            return;
        }

        info!(
            conversation,
            sender = %record.sender,
            content = %preview(&record.content),
            "Incoming message"
        );

        match self.registry.dispatch(&record).await {
            DispatchOutcome::Handled { plugin } => {
                debug!(conversation, plugin = %plugin, "Message handled");
            }
            DispatchOutcome::Unhandled => {
                info!(conversation, sender = %record.sender, "No plugin claimed the message");
            }
        }
    }
}
