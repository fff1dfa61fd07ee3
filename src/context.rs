//! Process-wide bot context: identity, roster, role groups, stop flag.
//!
//! Shared state that the original kept as free-floating globals lives here
//! behind defined operations. Each field has its own lock; nothing holds
//! one across an await.

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared bot context, constructed once at startup and passed by `Arc`.
pub struct BotContext {
    self_name: String,
    /// Known contact display names, as read from the surface at startup.
    roster: RwLock<Vec<String>>,
    /// Senders allowed to use administrative commands.
    commanders: RwLock<Vec<String>>,
    /// Senders allowed to use owner commands. The first owner receives
    /// operator notifications.
    owners: Vec<String>,
    stop: AtomicBool,
}

impl BotContext {
    pub fn new(self_name: impl Into<String>, owners: Vec<String>, commanders: Vec<String>) -> Self {
        Self {
            self_name: self_name.into(),
            roster: RwLock::new(Vec::new()),
            commanders: RwLock::new(commanders),
            owners,
            stop: AtomicBool::new(false),
        }
    }

    pub fn self_name(&self) -> &str {
        &self.self_name
    }

    pub fn is_self(&self, sender: &str) -> bool {
        sender == self.self_name
    }

    pub fn set_roster(&self, names: Vec<String>) {
        *self.roster.write().unwrap_or_else(|e| e.into_inner()) = names;
    }

    pub fn roster(&self) -> Vec<String> {
        self.roster.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_owner(&self, sender: &str) -> bool {
        self.owners.iter().any(|o| o == sender)
    }

    pub fn primary_owner(&self) -> Option<&str> {
        self.owners.first().map(String::as_str)
    }

    pub fn is_commander(&self, sender: &str) -> bool {
        self.commanders
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|c| c == sender)
    }

    /// Grant commander rights. Returns false if the sender already had them.
    pub fn add_commander(&self, sender: &str) -> bool {
        let mut commanders = self.commanders.write().unwrap_or_else(|e| e.into_inner());
        if commanders.iter().any(|c| c == sender) {
            return false;
        }
        commanders.push(sender.to_string());
        true
    }

    /// Revoke commander rights. Owners cannot be demoted. Returns false if
    /// the sender had no rights to revoke.
    pub fn remove_commander(&self, sender: &str) -> bool {
        if self.is_owner(sender) {
            return false;
        }
        let mut commanders = self.commanders.write().unwrap_or_else(|e| e.into_inner());
        let before = commanders.len();
        commanders.retain(|c| c != sender);
        commanders.len() < before
    }

    pub fn commanders(&self) -> Vec<String> {
        self.commanders
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Signal both loops to wind down at their next iteration boundary.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> BotContext {
        BotContext::new(
            "bot",
            vec!["owner".to_string()],
            vec!["owner".to_string(), "admin".to_string()],
        )
    }

    #[test]
    fn role_checks() {
        let ctx = ctx();
        assert!(ctx.is_owner("owner"));
        assert!(!ctx.is_owner("admin"));
        assert!(ctx.is_commander("admin"));
        assert!(!ctx.is_commander("alice"));
        assert!(ctx.is_self("bot"));
    }

    #[test]
    fn commander_roster_mutation() {
        let ctx = ctx();
        assert!(ctx.add_commander("alice"));
        assert!(!ctx.add_commander("alice"));
        assert!(ctx.is_commander("alice"));

        assert!(ctx.remove_commander("alice"));
        assert!(!ctx.remove_commander("alice"));
        assert!(!ctx.is_commander("alice"));

        // owners are protected from demotion
        assert!(!ctx.remove_commander("owner"));
        assert!(ctx.is_commander("owner"));
    }

    #[test]
    fn stop_flag_round_trip() {
        let ctx = ctx();
        assert!(!ctx.stop_requested());
        ctx.request_stop();
        assert!(ctx.stop_requested());
    }
}
