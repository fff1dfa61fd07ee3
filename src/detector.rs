//! New-message detection — turns repeated snapshot reads into events.
//!
//! The surface has no stable sequence numbers, so each poll re-reads the
//! last N visible messages and the detector decides what is genuinely new:
//! walk the snapshot newest to oldest, stop at the first record equal to
//! the newest cached one (the recency anchor — everything older is already
//! known), and dedup the rest against the whole cached history. When the
//! walk appended anything and the newest appended record was not authored
//! by the bot itself, the conversation is enqueued exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::ConversationCache;
use crate::config::BotConfig;
use crate::context::BotContext;
use crate::message::{MessageRecord, preview};
use crate::surface::{AutomationSurface, SnapshotItem};

/// Detects new messages in snapshots and enqueues conversations that have
/// them onto the event queue.
pub struct NewMessageDetector {
    cache: Arc<Mutex<ConversationCache>>,
    events: mpsc::UnboundedSender<String>,
    self_name: String,
}

impl NewMessageDetector {
    pub fn new(
        cache: Arc<Mutex<ConversationCache>>,
        events: mpsc::UnboundedSender<String>,
        self_name: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            events,
            self_name: self_name.into(),
        }
    }

    /// Ingest one newest-first snapshot of a conversation.
    ///
    /// Idempotent: re-observing an unchanged snapshot updates nothing and
    /// enqueues nothing. Unparseable elements (`None`) are skipped without
    /// aborting the walk.
    pub fn observe(&self, conversation: &str, snapshot: &[SnapshotItem]) {
        if snapshot.is_empty() {
            return;
        }

        let newest_appended = {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            let last_known = cache.latest(conversation).cloned();

            // Collected newest-first during the walk.
            let mut fresh: Vec<MessageRecord> = Vec::new();
            for item in snapshot {
                let Some(record) = item else {
                    continue;
                };
                if last_known.as_ref() == Some(record) {
                    break;
                }
                if cache.contains(conversation, record) || fresh.contains(record) {
                    continue;
                }
                fresh.push(record.clone());
            }

            if fresh.is_empty() {
                None
            } else {
                let newest = fresh[0].clone();
                // Append in chronological order so the cache stays oldest-first.
                for record in fresh.into_iter().rev() {
                    debug!(
                        conversation,
                        sender = %record.sender,
                        content = %preview(&record.content),
                        "New message"
                    );
                    cache.append(conversation, record);
                }
                Some(newest)
            }
        };

        if let Some(newest) = newest_appended {
            if newest.sender != self.self_name {
                info!(conversation, sender = %newest.sender, "Enqueuing conversation");
                let _ = self.events.send(conversation.to_string());
            } else {
                debug!(conversation, "Newest message is self-authored, not enqueuing");
            }
        }
    }
}

/// Spawn the timer-driven poll loop.
///
/// Returns a `JoinHandle` and a shutdown flag; set the flag to stop polling
/// after the current cycle. The loop also winds down when the context stop
/// flag is raised.
pub fn spawn_poller(
    surface: Arc<dyn AutomationSurface>,
    detector: NewMessageDetector,
    ctx: Arc<BotContext>,
    config: BotConfig,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(
            interval_ms = config.poll_interval.as_millis() as u64,
            listen_limit = config.listen_limit,
            "Poller started"
        );

        let mut tick = tokio::time::interval(config.poll_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) || ctx.stop_requested() {
                info!("Poller shutting down");
                return;
            }

            poll_once(
                surface.as_ref(),
                &detector,
                config.listen_limit,
                config.max_batch,
            )
            .await;
        }
    });

    (handle, shutdown_flag)
}

/// Run a single poll cycle: find one conversation with unread messages,
/// fetch a bounded snapshot, feed it to the detector.
///
/// Strictly one conversation per cycle — the surface exposes a single
/// focused view, and fetching refocuses it.
async fn poll_once(
    surface: &dyn AutomationSurface,
    detector: &NewMessageDetector,
    listen_limit: usize,
    max_batch: usize,
) {
    let unread = match surface.unread_conversations(listen_limit).await {
        Ok(unread) => unread,
        Err(e) => {
            warn!("Failed to read conversation list: {e}");
            return;
        }
    };

    for (conversation, count) in unread {
        if count == 0 {
            continue;
        }
        match surface
            .recent_messages(&conversation, count.min(max_batch))
            .await
        {
            Ok(snapshot) => detector.observe(&conversation, &snapshot),
            Err(e) => {
                warn!(conversation, "Failed to read messages: {e}");
            }
        }
        return;
    }
}

/// Hand-off queue between the detector and the dispatch loop.
pub fn event_queue() -> (mpsc::UnboundedSender<String>, mpsc::UnboundedReceiver<String>) {
    mpsc::unbounded_channel()
}

/// Drain the newest record for an event's conversation, if any.
pub fn latest_record(cache: &Arc<Mutex<ConversationCache>>, conversation: &str) -> Option<MessageRecord> {
    cache
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .latest(conversation)
        .cloned()
}

/// Bounded receive on the event queue. `None` on timeout, so callers can
/// re-check the stop flag between waits.
pub async fn next_event(
    rx: &mut mpsc::UnboundedReceiver<String>,
    wait: Duration,
) -> Option<Option<String>> {
    match tokio::time::timeout(wait, rx.recv()).await {
        Ok(event) => Some(event),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::Path;

    use async_trait::async_trait;

    use crate::error::SurfaceError;

    const BOT: &str = "hihi";

    fn setup(memory_len: usize) -> (NewMessageDetector, Arc<Mutex<ConversationCache>>, mpsc::UnboundedReceiver<String>) {
        let cache = Arc::new(Mutex::new(ConversationCache::new(memory_len)));
        let (tx, rx) = event_queue();
        let detector = NewMessageDetector::new(Arc::clone(&cache), tx, BOT);
        (detector, cache, rx)
    }

    fn from(sender: &str, content: &str) -> SnapshotItem {
        Some(MessageRecord::text(sender, None, content))
    }

    #[test]
    fn empty_cache_bulk_ingest_enqueues_once() {
        // Snapshot [A, B] newest-first on an empty cache → cache [B, A].
        let (detector, cache, mut rx) = setup(10);

        detector.observe("alice", &[from("alice", "A"), from("alice", "B")]);

        let cache = cache.lock().unwrap();
        let history = cache.history("alice");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "B");
        assert_eq!(history[1].content, "A");

        assert_eq!(rx.try_recv().unwrap(), "alice");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unchanged_snapshot_is_a_no_op() {
        let (detector, cache, mut rx) = setup(10);
        let snapshot = [from("alice", "A"), from("alice", "B")];

        detector.observe("alice", &snapshot);
        rx.try_recv().unwrap();

        detector.observe("alice", &snapshot);
        assert_eq!(cache.lock().unwrap().len("alice"), 2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn anchor_stops_the_walk() {
        // Cache [B, A]; snapshot [C, A, B] → only C is new.
        let (detector, cache, mut rx) = setup(10);
        detector.observe("alice", &[from("alice", "A"), from("alice", "B")]);
        rx.try_recv().unwrap();

        detector.observe("alice", &[from("alice", "C"), from("alice", "A"), from("alice", "B")]);

        let cache = cache.lock().unwrap();
        let history = cache.history("alice");
        assert_eq!(
            history.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
            vec!["B", "A", "C"]
        );
        assert_eq!(rx.try_recv().unwrap(), "alice");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn self_authored_newest_does_not_enqueue() {
        let (detector, cache, mut rx) = setup(10);
        detector.observe("alice", &[from("alice", "hello")]);
        rx.try_recv().unwrap();

        // Bot's own reply lands on screen next.
        detector.observe("alice", &[from(BOT, "hi alice"), from("alice", "hello")]);

        assert_eq!(cache.lock().unwrap().len("alice"), 2);
        assert!(rx.try_recv().is_err());

        // A later user message after the bot reply does enqueue.
        detector.observe(
            "alice",
            &[from("alice", "you there?"), from(BOT, "hi alice"), from("alice", "hello")],
        );
        assert_eq!(rx.try_recv().unwrap(), "alice");
    }

    #[test]
    fn empty_snapshot_is_a_no_op() {
        let (detector, cache, mut rx) = setup(10);
        detector.observe("alice", &[]);
        assert_eq!(cache.lock().unwrap().len("alice"), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unparseable_elements_are_skipped() {
        let (detector, cache, mut rx) = setup(10);
        detector.observe("alice", &[from("alice", "B"), None, from("alice", "A")]);

        let cache = cache.lock().unwrap();
        let history = cache.history("alice");
        assert_eq!(
            history.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
            vec!["A", "B"]
        );
        assert_eq!(rx.try_recv().unwrap(), "alice");
    }

    #[test]
    fn bulk_ingest_respects_capacity() {
        let (detector, cache, mut rx) = setup(3);
        let snapshot: Vec<SnapshotItem> = (0..6)
            .map(|i| from("alice", &format!("m{i}")))
            .collect();

        detector.observe("alice", &snapshot);

        let cache = cache.lock().unwrap();
        let history = cache.history("alice");
        // Only the newest memory_len survive; m0 is the newest snapshot item.
        assert_eq!(
            history.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
            vec!["m2", "m1", "m0"]
        );
        assert_eq!(rx.try_recv().unwrap(), "alice");
    }

    #[test]
    fn duplicate_records_collapse() {
        let (detector, cache, mut rx) = setup(10);
        // The same text twice in one snapshot is one record by identity.
        detector.observe("alice", &[from("alice", "hi"), from("alice", "hi")]);
        assert_eq!(cache.lock().unwrap().len("alice"), 1);
        assert_eq!(rx.try_recv().unwrap(), "alice");
    }

    #[tokio::test]
    async fn next_event_times_out() {
        let (_tx, mut rx) = event_queue();
        let got = next_event(&mut rx, Duration::from_millis(10)).await;
        assert!(got.is_none());
    }

    /// Surface that fails its first few reads, then behaves.
    struct FlakySurface {
        list_failures: Mutex<usize>,
        read_failures: Mutex<usize>,
        record: MessageRecord,
    }

    impl FlakySurface {
        fn new(list_failures: usize, read_failures: usize) -> Self {
            Self {
                list_failures: Mutex::new(list_failures),
                read_failures: Mutex::new(read_failures),
                record: MessageRecord::text("alice", None, "hello"),
            }
        }
    }

    #[async_trait]
    impl AutomationSurface for FlakySurface {
        async fn unread_conversations(
            &self,
            _limit: usize,
        ) -> Result<Vec<(String, usize)>, SurfaceError> {
            let mut failures = self.list_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(SurfaceError::ConversationList(
                    "window lost focus".to_string(),
                ));
            }
            Ok(vec![("alice".to_string(), 1)])
        }

        async fn recent_messages(
            &self,
            conversation: &str,
            _n: usize,
        ) -> Result<Vec<SnapshotItem>, SurfaceError> {
            let mut failures = self.read_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(SurfaceError::MessageRead {
                    conversation: conversation.to_string(),
                    reason: "list item vanished".to_string(),
                });
            }
            Ok(vec![Some(self.record.clone())])
        }

        async fn send_text(&self, _conversation: &str, _text: &str) -> Result<(), SurfaceError> {
            Ok(())
        }

        async fn send_media(&self, _conversation: &str, _path: &Path) -> Result<(), SurfaceError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn list_read_errors_skip_the_cycle() {
        let (detector, cache, mut rx) = setup(10);
        let surface = FlakySurface::new(2, 0);

        // Two failing cycles leave no trace.
        poll_once(&surface, &detector, 5, 4).await;
        poll_once(&surface, &detector, 5, 4).await;
        assert_eq!(cache.lock().unwrap().len("alice"), 0);
        assert!(rx.try_recv().is_err());

        // The next cycle recovers without intervention.
        poll_once(&surface, &detector, 5, 4).await;
        assert_eq!(rx.try_recv().unwrap(), "alice");
        assert_eq!(cache.lock().unwrap().len("alice"), 1);
    }

    #[tokio::test]
    async fn message_read_errors_skip_the_cycle() {
        let (detector, cache, mut rx) = setup(10);
        let surface = FlakySurface::new(0, 1);

        poll_once(&surface, &detector, 5, 4).await;
        assert_eq!(cache.lock().unwrap().len("alice"), 0);
        assert!(rx.try_recv().is_err());

        poll_once(&surface, &detector, 5, 4).await;
        assert_eq!(rx.try_recv().unwrap(), "alice");
    }
}
