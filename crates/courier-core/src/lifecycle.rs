//! Tracking of live request/response pairs within a session.
//!
//! A session registers every pair it creates in its [`StreamRegistry`] and
//! hands the pair a [`StreamTicket`]. When the session ends it aborts all
//! registered tickets at once, which wakes any `send` still waiting on the
//! stream. A ticket leaves the registry when its response finishes or when
//! the pair is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::watch;

/// Lifecycle state of one pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamState {
    /// The stream can still carry a response.
    Open,
    /// The response completed.
    Finished,
    /// The owning session ended first.
    Aborted(Arc<str>),
}

/// The set of live pairs of one session.
///
/// Safe against pairs registering and deregistering while
/// [`abort_all`](Self::abort_all) walks the set.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    next_id: AtomicU64,
    live: DashMap<u64, watch::Sender<StreamState>>,
}

impl StreamRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a new pair.
    pub fn register(self: &Arc<Self>) -> StreamTicket {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(StreamState::Open);
        self.live.insert(id, tx);
        StreamTicket {
            id,
            state: rx,
            registry: Arc::downgrade(self),
            _detached: None,
        }
    }

    /// Number of live pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Returns true if no pair is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Marks every live pair as aborted and returns how many there were.
    pub fn abort_all(&self, reason: &str) -> usize {
        let reason: Arc<str> = Arc::from(reason);
        let mut count = 0;
        for entry in &self.live {
            entry.value().send_replace(StreamState::Aborted(Arc::clone(&reason)));
            count += 1;
        }
        count
    }

    fn release(&self, id: u64, state: StreamState) {
        if let Some((_, tx)) = self.live.remove(&id) {
            tx.send_replace(state);
        }
    }
}

/// A pair's membership in a [`StreamRegistry`].
#[derive(Debug)]
pub struct StreamTicket {
    id: u64,
    state: watch::Receiver<StreamState>,
    registry: Weak<StreamRegistry>,
    // Keeps the channel alive for tickets that belong to no session.
    _detached: Option<watch::Sender<StreamState>>,
}

impl StreamTicket {
    /// Creates a ticket outside any session. It is never aborted.
    #[must_use]
    pub fn detached() -> Self {
        let (tx, rx) = watch::channel(StreamState::Open);
        Self {
            id: u64::MAX,
            state: rx,
            registry: Weak::new(),
            _detached: Some(tx),
        }
    }

    /// Registry-local identifier.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> StreamState {
        self.state.borrow().clone()
    }

    /// Returns true while the pair is neither finished nor aborted.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(*self.state.borrow(), StreamState::Open)
    }

    /// Resolves with the reason once the owning session aborts the pair.
    ///
    /// Never resolves for a pair that finishes normally.
    pub async fn aborted(&self) -> Arc<str> {
        let mut state = self.state.clone();
        let result = state
            .wait_for(|s| matches!(s, StreamState::Aborted(_)))
            .await
            .map(|s| match &*s {
                StreamState::Aborted(reason) => Some(Arc::clone(reason)),
                _ => None,
            });
        match result {
            Ok(Some(reason)) => reason,
            _ => std::future::pending().await,
        }
    }

    /// Marks the pair finished and leaves the registry.
    pub fn finish(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.release(self.id, StreamState::Finished);
        }
    }
}

impl Drop for StreamTicket {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.release(self.id, StreamState::Finished);
        }
    }
}
