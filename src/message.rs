//! Message records — immutable values identifying one message occurrence.
//!
//! Identity is content-based, not time-based: two records with the same
//! kind, sender, conversation, content and meaningfulness are the same
//! record. The upstream surface has no stable sequence numbers, so this
//! content hash is the only identity the detector can anchor on. A known
//! consequence is that identical texts sent in quick succession collapse
//! into one record.

use sha2::{Digest, Sha256};

/// What kind of chat message a record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Sticker,
    Other,
}

/// Immutable parsed representation of one chat message occurrence.
///
/// Fields are fixed at construction; equality and hashing cover exactly the
/// identity signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageRecord {
    pub kind: MessageKind,
    /// Display name of the author.
    pub sender: String,
    /// Group conversation name, or `None` for a direct chat.
    pub conversation: Option<String>,
    /// Text content, or an opaque description for non-text kinds.
    pub content: String,
    /// Whether the content carries meaning worth feeding to a completion
    /// (an unparseable image is recorded but marked meaningless).
    pub is_meaningful: bool,
}

impl MessageRecord {
    pub fn text(sender: impl Into<String>, conversation: Option<String>, content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Text,
            sender: sender.into(),
            conversation,
            content: content.into(),
            is_meaningful: true,
        }
    }

    pub fn new(
        kind: MessageKind,
        sender: impl Into<String>,
        conversation: Option<String>,
        content: impl Into<String>,
        is_meaningful: bool,
    ) -> Self {
        Self {
            kind,
            sender: sender.into(),
            conversation,
            content: content.into(),
            is_meaningful,
        }
    }

    /// Stable hex identity over the full signature. Useful for logging and
    /// cross-process correlation; in-process dedup uses `Eq`/`Hash`.
    pub fn identity(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update([self.kind as u8]);
        hasher.update(b"|");
        hasher.update(self.sender.as_bytes());
        hasher.update(b"|");
        if let Some(conversation) = &self.conversation {
            hasher.update(conversation.as_bytes());
        }
        hasher.update(b"|");
        hasher.update(self.content.as_bytes());
        hasher.update(b"|");
        hasher.update([self.is_meaningful as u8]);
        format!("{:x}", hasher.finalize())
    }

    /// Whether this message came from a group conversation.
    pub fn from_group(&self) -> bool {
        self.conversation.is_some()
    }

    /// Where a reply should go: the group conversation, or back to the
    /// sender for a direct chat.
    pub fn reply_target(&self) -> &str {
        self.conversation.as_deref().unwrap_or(&self.sender)
    }
}

/// Elide long content to a head…tail preview for logging.
pub fn preview(content: &str) -> String {
    let flat: String = content.chars().filter(|c| *c != '\n').collect();
    if flat.chars().count() < 40 {
        return content.to_string();
    }
    let head: String = flat.chars().take(10).collect();
    let tail_start = flat.chars().count() - 10;
    let tail: String = flat.chars().skip(tail_start).collect();
    format!("\u{201c}{head}......{tail}\u{201d}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_content_means_equal_record() {
        let a = MessageRecord::text("alice", None, "hello");
        let b = MessageRecord::text("alice", None, "hello");
        assert_eq!(a, b);
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn any_signature_field_changes_identity() {
        let base = MessageRecord::text("alice", None, "hello");

        let other_sender = MessageRecord::text("bob", None, "hello");
        let other_content = MessageRecord::text("alice", None, "hello!");
        let other_conv = MessageRecord::text("alice", Some("room".into()), "hello");
        let other_kind = MessageRecord::new(MessageKind::Image, "alice", None, "hello", true);
        let other_meaning = MessageRecord::new(MessageKind::Text, "alice", None, "hello", false);

        for other in [other_sender, other_content, other_conv, other_kind, other_meaning] {
            assert_ne!(base, other);
            assert_ne!(base.identity(), other.identity());
        }
    }

    #[test]
    fn reply_target_prefers_group() {
        let direct = MessageRecord::text("alice", None, "hi");
        assert_eq!(direct.reply_target(), "alice");
        assert!(!direct.from_group());

        let grouped = MessageRecord::text("alice", Some("friends".into()), "hi");
        assert_eq!(grouped.reply_target(), "friends");
        assert!(grouped.from_group());
    }

    #[test]
    fn preview_elides_long_content() {
        let short = "hello there";
        assert_eq!(preview(short), short);

        let long = "x".repeat(100);
        let p = preview(&long);
        assert!(p.contains("......"));
        assert!(p.chars().count() < 30);
    }
}
