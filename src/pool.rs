//! Per-sender completion pool.
//!
//! Serializes conversation history per sender while completions for
//! different senders run fully in parallel. `submit` appends the user turn
//! and snapshots the history synchronously, then hands the snapshot to a
//! detached task; the caller gets an index back immediately and trades it
//! in later via `collect` under a timeout. A collect that times out
//! abandons the request — the task may still finish, but its result is
//! discarded and never reaches the history.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::llm::{CompletionProvider, Turn};
use crate::message::preview;

/// Request indices wrap at the same large bound the in-flight table can
/// never approach.
const INDEX_BOUND: u64 = 2_000_000_000;

/// Entries whose caller never collects are pruned on a later `submit` once
/// their task has finished and this much time has passed. Any caller that
/// collects within its timeout is unaffected.
const STALE_AFTER: Duration = Duration::from_secs(300);

/// One spawned completion, keyed by request index until collected or pruned.
struct InFlight {
    handle: JoinHandle<Option<String>>,
    submitted: Instant,
}

/// Bounded FIFO of role-tagged turns for one sender.
struct TurnHistory {
    turns: VecDeque<Turn>,
    capacity: usize,
}

impl TurnHistory {
    fn new(capacity: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn push(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.capacity {
            self.turns.pop_front();
        }
    }

    /// Ordered copy of the history, optionally prefixed with a system
    /// directive. The prefix is not stored and does not count against
    /// capacity.
    fn snapshot(&self, system_prompt: Option<&str>) -> Vec<Turn> {
        let mut turns = Vec::with_capacity(self.turns.len() + 1);
        if let Some(prompt) = system_prompt {
            turns.push(Turn::system(prompt));
        }
        turns.extend(self.turns.iter().cloned());
        turns
    }
}

/// Identifier handed back by `submit` and redeemed by `collect`.
pub type RequestId = u64;

pub struct CompletionPool {
    provider: Arc<dyn CompletionProvider>,
    history_len: usize,
    histories: Mutex<HashMap<String, Arc<Mutex<TurnHistory>>>>,
    in_flight: Mutex<HashMap<RequestId, InFlight>>,
    next_index: AtomicU64,
}

impl CompletionPool {
    pub fn new(provider: Arc<dyn CompletionProvider>, history_len: usize) -> Self {
        Self {
            provider,
            history_len,
            histories: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            next_index: AtomicU64::new(0),
        }
    }

    /// Each sender gets its own guard; the outer map lock is held only for
    /// the lookup so unrelated senders never contend.
    fn history_for(&self, sender: &str) -> Arc<Mutex<TurnHistory>> {
        let mut histories = self.histories.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            histories
                .entry(sender.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(TurnHistory::new(self.history_len)))),
        )
    }

    fn next_index(&self) -> RequestId {
        self.next_index.fetch_add(1, Ordering::Relaxed) % INDEX_BOUND
    }

    /// Append `turn` to the sender's history and start one completion over
    /// the resulting snapshot. Returns immediately with the request index;
    /// never blocks on the network call.
    ///
    /// The user turn lands in history before this returns, so turns are
    /// ordered by submission call order even when completions race.
    pub fn submit(&self, sender: &str, turn: Turn, system_prompt: Option<String>) -> RequestId {
        let history = self.history_for(sender);
        let snapshot = {
            let mut history = history.lock().unwrap_or_else(|e| e.into_inner());
            history.push(turn);
            history.snapshot(system_prompt.as_deref())
        };

        let index = self.next_index();
        let provider = Arc::clone(&self.provider);
        let task_sender = sender.to_string();
        let handle = tokio::spawn(async move {
            match provider.complete(&snapshot).await {
                Ok(text) => {
                    debug!(
                        sender = %task_sender,
                        reply = %preview(&text),
                        "Completion finished"
                    );
                    Some(text)
                }
                Err(e) => {
                    warn!(sender = %task_sender, "Completion failed: {e}");
                    None
                }
            }
        });

        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        // A submitted-but-never-collected request would sit here forever.
        in_flight.retain(|_, entry| {
            !(entry.handle.is_finished() && entry.submitted.elapsed() >= STALE_AFTER)
        });
        in_flight.insert(
            index,
            InFlight {
                handle,
                submitted: Instant::now(),
            },
        );
        drop(in_flight);

        debug!(sender, index, "Completion submitted");
        index
    }

    /// Wait up to `timeout` for the request's result.
    ///
    /// Returns `None` for an unknown or already-collected index, a failed
    /// completion, or a timeout. On timeout the in-flight task is
    /// abandoned, not cancelled: it may still finish, but its result is
    /// dropped on the floor.
    pub async fn collect(&self, index: RequestId, timeout: Duration) -> Option<String> {
        let entry = self
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&index)?;

        match tokio::time::timeout(timeout, entry.handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(index, "Completion task panicked: {e}");
                None
            }
            Err(_) => {
                warn!(index, "Gave up waiting for completion");
                None
            }
        }
    }

    /// Append an assistant reply to the sender's history. Callers do this
    /// after a successful `collect`; nothing appends replies automatically.
    pub fn append_assistant(&self, sender: &str, text: impl Into<String>) {
        let history = self.history_for(sender);
        history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Turn::assistant(text));
    }

    /// Empty one sender's history. In-flight requests are unaffected; they
    /// still complete or get abandoned normally.
    pub fn clear(&self, sender: &str) {
        let history = self.history_for(sender);
        history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .turns
            .clear();
    }

    /// Ordered copy of one sender's history.
    pub fn history(&self, sender: &str) -> Vec<Turn> {
        let history = self.history_for(sender);
        let history = history.lock().unwrap_or_else(|e| e.into_inner());
        history.snapshot(None)
    }
}
