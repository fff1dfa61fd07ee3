//! Automation surface boundary.
//!
//! The real surface drives a scraped messaging UI (focus a conversation,
//! read visible list items, paste text). That layer lives outside this
//! crate; the core only depends on this trait. Reads are snapshots of
//! whatever is currently visible and may repeat content already seen —
//! the detector is responsible for turning them into new-message events.
//!
//! A stdin/stdout implementation is included for local runs, in the spirit
//! of a REPL channel: every line typed is one unread message from a fixed
//! local user.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::SurfaceError;
use crate::message::MessageRecord;

/// One element of a message snapshot. `None` marks a visible element the
/// surface could not parse; the detector skips it without aborting the walk.
pub type SnapshotItem = Option<MessageRecord>;

/// The messaging surface the bot automates.
///
/// Exactly one poll loop may drive a surface at a time: the underlying UI
/// exposes a single focused view, and concurrent pollers would race on it.
#[async_trait]
pub trait AutomationSurface: Send + Sync {
    /// The first `limit` visible conversations with their unread counts,
    /// in display order.
    async fn unread_conversations(
        &self,
        limit: usize,
    ) -> Result<Vec<(String, usize)>, SurfaceError>;

    /// Up to `n` most recent visible messages of a conversation,
    /// newest-first. Focuses the conversation as a side effect.
    async fn recent_messages(
        &self,
        conversation: &str,
        n: usize,
    ) -> Result<Vec<SnapshotItem>, SurfaceError>;

    /// Send text into a conversation. Best-effort: a success return means
    /// the surface accepted the send, not that it was delivered.
    async fn send_text(&self, conversation: &str, text: &str) -> Result<(), SurfaceError>;

    /// Send a media file into a conversation.
    async fn send_media(&self, conversation: &str, path: &Path) -> Result<(), SurfaceError>;

    /// Contact display names, read once at startup to seed the roster.
    async fn contacts(&self) -> Result<Vec<String>, SurfaceError> {
        Ok(Vec::new())
    }
}

/// How many transcript entries the CLI surface keeps visible.
const CLI_TRANSCRIPT_LEN: usize = 50;

#[derive(Default)]
struct CliState {
    transcript: VecDeque<MessageRecord>,
    unread: usize,
}

/// stdin/stdout surface for local testing.
pub struct CliSurface {
    user: String,
    bot_name: String,
    state: Arc<Mutex<CliState>>,
}

impl CliSurface {
    /// Create the surface and start reading stdin in the background.
    pub fn start(user: impl Into<String>, bot_name: impl Into<String>) -> Self {
        let user = user.into();
        let state = Arc::new(Mutex::new(CliState::default()));

        let reader_user = user.clone();
        let reader_state = Arc::clone(&state);
        tokio::spawn(async move {
            use tokio::io::{AsyncBufReadExt, BufReader};

            let stdin = tokio::io::stdin();
            let mut lines = BufReader::new(stdin).lines();
            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            eprint!("> ");
                            continue;
                        }
                        let record = MessageRecord::text(reader_user.clone(), None, line);
                        let mut state = reader_state.lock().unwrap_or_else(|e| e.into_inner());
                        push_visible(&mut state.transcript, record);
                        state.unread += 1;
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        Self {
            user,
            bot_name: bot_name.into(),
            state,
        }
    }
}

fn push_visible(transcript: &mut VecDeque<MessageRecord>, record: MessageRecord) {
    transcript.push_back(record);
    while transcript.len() > CLI_TRANSCRIPT_LEN {
        transcript.pop_front();
    }
}

#[async_trait]
impl AutomationSurface for CliSurface {
    async fn unread_conversations(
        &self,
        _limit: usize,
    ) -> Result<Vec<(String, usize)>, SurfaceError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.unread == 0 {
            return Ok(Vec::new());
        }
        Ok(vec![(self.user.clone(), state.unread)])
    }

    async fn recent_messages(
        &self,
        conversation: &str,
        n: usize,
    ) -> Result<Vec<SnapshotItem>, SurfaceError> {
        if conversation != self.user {
            return Ok(Vec::new());
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.unread = 0;
        Ok(state
            .transcript
            .iter()
            .rev()
            .take(n)
            .cloned()
            .map(Some)
            .collect())
    }

    async fn send_text(&self, _conversation: &str, text: &str) -> Result<(), SurfaceError> {
        println!("\n{}\n", text);
        eprint!("> ");
        // Keep the transcript consistent with what would be on screen.
        let record = MessageRecord::text(self.bot_name.clone(), None, text);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        push_visible(&mut state.transcript, record);
        Ok(())
    }

    async fn send_media(&self, conversation: &str, path: &Path) -> Result<(), SurfaceError> {
        if !path.exists() {
            return Err(SurfaceError::MediaNotFound(path.display().to_string()));
        }
        println!("\n[media] {}\n", path.display());
        eprint!("> ");
        let _ = conversation;
        Ok(())
    }

    async fn contacts(&self) -> Result<Vec<String>, SurfaceError> {
        Ok(vec![self.user.clone()])
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cli_surface_reports_unread_then_clears() {
        let surface = CliSurface::start("local-user", "bot");

        // Simulate two typed lines.
        {
            let mut state = surface.state.lock().unwrap();
            push_visible(
                &mut state.transcript,
                MessageRecord::text("local-user", None, "hi"),
            );
            push_visible(
                &mut state.transcript,
                MessageRecord::text("local-user", None, "there"),
            );
            state.unread = 2;
        }

        let unread = surface.unread_conversations(5).await.unwrap();
        assert_eq!(unread, vec![("local-user".to_string(), 2)]);

        let snapshot = surface.recent_messages("local-user", 4).await.unwrap();
        // newest-first
        assert_eq!(snapshot[0].as_ref().unwrap().content, "there");
        assert_eq!(snapshot[1].as_ref().unwrap().content, "hi");

        assert!(surface.unread_conversations(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_media_requires_existing_file() {
        let surface = CliSurface::start("local-user", "bot");
        let err = surface
            .send_media("local-user", Path::new("/definitely/not/here.png"))
            .await;
        assert!(matches!(err, Err(SurfaceError::MediaNotFound(_))));
    }
}
