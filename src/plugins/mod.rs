//! Plugin capability contract, registry and dispatch pipeline.
//!
//! Plugins are authored independently and only meet through the registry.
//! The capability contract is the `Plugin` trait: `claims` decides whether
//! a message belongs to the plugin, `handle` acts on it. Dispatch walks
//! plugins in registration order and stops at the first claimant —
//! first-match-wins, never multicast. A message nobody claims comes back
//! as an explicit `Unhandled`, never silently dropped.
//!
//! `bind` is the deliberate coupling escape hatch: after loading, every
//! plugin receives a read-only view of the registry so that, e.g., the
//! admin plugin can reset the responder's per-sender state. Concrete
//! access goes through `RegistryView::get_as`, a typed downcast rather
//! than open access to internals.

pub mod admin;
pub mod owner;
pub mod responder;

pub use admin::AdminPlugin;
pub use owner::OwnerPlugin;
pub use responder::ResponderPlugin;

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::PluginError;
use crate::message::MessageRecord;

/// The capability contract every plugin implements.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Unique name, also the registry key.
    fn name(&self) -> &str;

    /// Called once, before `init`, with a read-only view of the full
    /// registry. Most plugins don't need it.
    fn bind(&self, _registry: &RegistryView) {}

    /// Called once after all plugins are bound. A failure excludes this
    /// plugin from dispatch without affecting the others.
    async fn init(&self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Whether this plugin wants the message. Expected side-effect-free.
    fn claims(&self, record: &MessageRecord) -> bool;

    /// Act on a claimed message. An error is logged and treated as a
    /// non-claim; dispatch moves on to the next plugin.
    async fn handle(&self, record: &MessageRecord) -> Result<(), PluginError>;

    /// Escape hatch for typed cross-plugin access via `RegistryView::get_as`.
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Read-only, by-name view of the loaded plugins.
#[derive(Clone, Default)]
pub struct RegistryView {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl RegistryView {
    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    /// Look up a plugin and downcast it to its concrete type.
    pub fn get_as<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.get(name)?.as_any().downcast::<T>().ok()
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }
}

/// Outcome of dispatching one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Exactly one plugin handled the message.
    Handled { plugin: String },
    /// No plugin claimed (or every claimant failed).
    Unhandled,
}

/// Ordered set of loaded plugins.
pub struct PluginRegistry {
    /// Dispatch order = registration order.
    order: Vec<Arc<dyn Plugin>>,
    view: RegistryView,
}

impl PluginRegistry {
    /// Load plugins: filter the disabled ones, reject duplicate names,
    /// bind everyone, then init everyone. A plugin whose `init` fails is
    /// excluded from dispatch with a diagnostic; the rest are unaffected.
    pub async fn load(
        candidates: Vec<Arc<dyn Plugin>>,
        disabled: &[String],
    ) -> Result<Self, PluginError> {
        let mut order: Vec<Arc<dyn Plugin>> = Vec::with_capacity(candidates.len());
        let mut by_name: HashMap<String, Arc<dyn Plugin>> = HashMap::new();

        for plugin in candidates {
            let name = plugin.name().to_string();
            if disabled.iter().any(|d| d == &name) {
                info!(plugin = %name, "Plugin disabled by configuration");
                continue;
            }
            if by_name.contains_key(&name) {
                return Err(PluginError::DuplicateName(name));
            }
            by_name.insert(name, Arc::clone(&plugin));
            order.push(plugin);
        }

        let view = RegistryView { plugins: by_name };

        for plugin in &order {
            plugin.bind(&view);
        }

        let mut initialized: Vec<Arc<dyn Plugin>> = Vec::with_capacity(order.len());
        for plugin in order {
            match plugin.init().await {
                Ok(()) => {
                    info!(plugin = %plugin.name(), "Plugin loaded");
                    initialized.push(plugin);
                }
                Err(e) => {
                    warn!(plugin = %plugin.name(), "Plugin excluded, init failed: {e}");
                }
            }
        }

        Ok(Self {
            order: initialized,
            view,
        })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn view(&self) -> &RegistryView {
        &self.view
    }

    /// Find the single handler for a message.
    ///
    /// At most one plugin's `handle` runs to completion. A handler error is
    /// logged, counted as a non-claim, and the walk continues.
    pub async fn dispatch(&self, record: &MessageRecord) -> DispatchOutcome {
        for plugin in &self.order {
            if !plugin.claims(record) {
                continue;
            }
            match plugin.handle(record).await {
                Ok(()) => {
                    return DispatchOutcome::Handled {
                        plugin: plugin.name().to_string(),
                    };
                }
                Err(e) => {
                    warn!(plugin = %plugin.name(), "Plugin handler failed: {e}");
                }
            }
        }
        DispatchOutcome::Unhandled
    }
}
