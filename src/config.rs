//! Configuration types.
//!
//! Everything is env-driven with sensible defaults; full config-file
//! loading belongs to the startup layer, not this core.

use std::collections::HashMap;
use std::time::Duration;

use secrecy::SecretString;

/// Bot core configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// The bot's own display name, used to recognize self-authored messages
    /// and group @-mentions.
    pub self_name: String,
    /// Conversation cache capacity per conversation.
    pub memory_len: usize,
    /// How many of the top visible conversations the poller inspects.
    pub listen_limit: usize,
    /// Upper bound on messages fetched from one conversation per cycle.
    pub max_batch: usize,
    /// Sleep between poll cycles.
    pub poll_interval: Duration,
    /// Bounded wait of the dispatch loop on an empty event queue.
    pub queue_wait: Duration,
    /// Per-sender completion history capacity.
    pub history_len: usize,
    /// How long `collect` waits for a completion before giving up.
    pub collect_timeout: Duration,
    /// Plugin names excluded at load time.
    pub disabled_plugins: Vec<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            self_name: "hihi".to_string(),
            memory_len: 10,
            listen_limit: 5,
            max_batch: 4,
            poll_interval: Duration::from_secs(1),
            queue_wait: Duration::from_secs(1),
            history_len: 20,
            collect_timeout: Duration::from_secs(32),
            disabled_plugins: Vec::new(),
        }
    }
}

impl BotConfig {
    /// Build from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            self_name: std::env::var("CHATPILOT_SELF_NAME").unwrap_or(defaults.self_name),
            memory_len: env_usize("CHATPILOT_MEMORY_LEN", defaults.memory_len),
            listen_limit: env_usize("CHATPILOT_LISTEN_LIMIT", defaults.listen_limit),
            max_batch: env_usize("CHATPILOT_MAX_BATCH", defaults.max_batch),
            poll_interval: Duration::from_millis(env_u64(
                "CHATPILOT_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )),
            queue_wait: defaults.queue_wait,
            history_len: env_usize("CHATPILOT_HISTORY_LEN", defaults.history_len),
            collect_timeout: Duration::from_secs(env_u64(
                "CHATPILOT_COLLECT_TIMEOUT_SECS",
                defaults.collect_timeout.as_secs(),
            )),
            disabled_plugins: std::env::var("CHATPILOT_DISABLED_PLUGINS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

/// Completion-provider configuration (OpenAI-compatible endpoint).
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub request_timeout: Duration,
}

impl ProviderConfig {
    /// Build from environment variables. Returns `None` when no API key is
    /// configured, in which case the responder plugin cannot run.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("CHATPILOT_API_KEY").ok()?;

        let base_url = std::env::var("CHATPILOT_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let model =
            std::env::var("CHATPILOT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        Some(Self {
            base_url,
            api_key: SecretString::from(api_key),
            model,
            temperature: env_f32("CHATPILOT_TEMPERATURE"),
            max_tokens: std::env::var("CHATPILOT_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok()),
            top_p: env_f32("CHATPILOT_TOP_P"),
            frequency_penalty: env_f32("CHATPILOT_FREQUENCY_PENALTY"),
            request_timeout: Duration::from_secs(env_u64("CHATPILOT_REQUEST_TIMEOUT_SECS", 30)),
        })
    }
}

/// Named system prompts selectable per sender.
#[derive(Debug, Clone)]
pub struct PersonaSet {
    personas: HashMap<String, String>,
    default_name: String,
}

impl PersonaSet {
    pub fn new(personas: HashMap<String, String>, default_name: impl Into<String>) -> Self {
        Self {
            personas,
            default_name: default_name.into(),
        }
    }

    /// The built-in set: a plain assistant persona plus `none` (no system
    /// prompt at all).
    pub fn builtin() -> Self {
        let mut personas = HashMap::new();
        personas.insert(
            "assistant".to_string(),
            "You are a friendly chat assistant. Keep replies short and \
             conversational; this is a casual messaging app, not a terminal."
                .to_string(),
        );
        personas.insert("none".to_string(), String::new());
        Self::new(personas, "assistant")
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    pub fn contains(&self, name: &str) -> bool {
        self.personas.contains_key(name)
    }

    /// The system prompt for a persona, or `None` when the persona is
    /// unknown or deliberately empty.
    pub fn prompt(&self, name: &str) -> Option<&str> {
        self.personas.get(name).map(String::as_str).filter(|p| !p.is_empty())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.personas.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_f32(key: &str) -> Option<f32> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_reasonable() {
        let config = BotConfig::default();
        assert!(config.memory_len >= config.max_batch);
        assert!(config.poll_interval >= Duration::from_millis(100));
    }

    #[test]
    fn builtin_personas_resolve() {
        let personas = PersonaSet::builtin();
        assert!(personas.contains("assistant"));
        assert!(personas.contains("none"));
        assert!(personas.prompt("assistant").is_some());
        // "none" exists but contributes no system prompt
        assert!(personas.prompt("none").is_none());
        assert!(personas.prompt("missing").is_none());
        assert_eq!(personas.default_name(), "assistant");
    }
}
