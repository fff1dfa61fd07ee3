//! Conversation cache — bounded per-conversation message history.
//!
//! One entry per conversation, created lazily on first observation and kept
//! for the process lifetime. Each entry is an oldest-first FIFO capped at
//! `memory_len`; overflow evicts the oldest record. The cache doubles as
//! the membership test the detector dedups against. It is a separate
//! structure from the completion pool's per-sender history and may be
//! cleared independently of it.

use std::collections::{HashMap, VecDeque};

use crate::message::MessageRecord;

pub struct ConversationCache {
    memory_len: usize,
    conversations: HashMap<String, VecDeque<MessageRecord>>,
}

impl ConversationCache {
    pub fn new(memory_len: usize) -> Self {
        Self {
            memory_len: memory_len.max(1),
            conversations: HashMap::new(),
        }
    }

    pub fn memory_len(&self) -> usize {
        self.memory_len
    }

    /// The newest known record for a conversation, if any.
    pub fn latest(&self, conversation: &str) -> Option<&MessageRecord> {
        self.conversations.get(conversation)?.back()
    }

    /// Whether an equal record is present anywhere in the conversation's
    /// history.
    pub fn contains(&self, conversation: &str, record: &MessageRecord) -> bool {
        self.conversations
            .get(conversation)
            .is_some_and(|history| history.contains(record))
    }

    /// Append a record as the newest, evicting the oldest on overflow.
    pub fn append(&mut self, conversation: &str, record: MessageRecord) {
        let history = self
            .conversations
            .entry(conversation.to_string())
            .or_default();
        history.push_back(record);
        while history.len() > self.memory_len {
            history.pop_front();
        }
    }

    /// Oldest-first copy of a conversation's history.
    pub fn history(&self, conversation: &str) -> Vec<MessageRecord> {
        self.conversations
            .get(conversation)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of cached records for a conversation.
    pub fn len(&self, conversation: &str) -> usize {
        self.conversations
            .get(conversation)
            .map_or(0, VecDeque::len)
    }

    pub fn clear(&mut self, conversation: &str) {
        if let Some(history) = self.conversations.get_mut(conversation) {
            history.clear();
        }
    }
}
