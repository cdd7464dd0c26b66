//! Shutdown coordination.
//!
//! [`ShutdownSignal`] tells the accept loop and in-progress handshakes to
//! stop. [`ConnectionTracker`] counts live connections so `close` can wait
//! for them to drain.
//!
//! # Example
//!
//! ```rust
//! use courier_server::{ConnectionTracker, ShutdownSignal};
//!
//! let shutdown = ShutdownSignal::new();
//! let tracker = ConnectionTracker::new();
//!
//! let token = tracker.acquire();
//! assert_eq!(tracker.active_connections(), 1);
//!
//! shutdown.trigger();
//! assert!(shutdown.is_triggered());
//!
//! drop(token);
//! assert_eq!(tracker.active_connections(), 0);
//! ```

use std::sync::Arc;

use tokio::sync::watch;

/// A one-way, cloneable stop flag.
///
/// All clones observe the same trigger. Triggering twice is a no-op.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    flag: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    /// Creates an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self { flag: Arc::new(flag) }
    }

    /// Creates a signal that triggers on SIGTERM or SIGINT (Ctrl+C on
    /// non-Unix platforms).
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn with_os_signals() -> Self {
        let signal = Self::new();
        let trigger = signal.clone();
        tokio::spawn(async move {
            if wait_for_os_signal().await {
                trigger.trigger();
            }
        });
        signal
    }

    /// Triggers the signal.
    pub fn trigger(&self) {
        self.flag.send_if_modified(|triggered| !std::mem::replace(triggered, true));
    }

    /// Returns true once triggered.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.flag.borrow()
    }

    /// Resolves once triggered, immediately if it already was.
    pub async fn triggered(&self) {
        let mut rx = self.flag.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns false if no signal handler could be installed.
async fn wait_for_os_signal() -> bool {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(err), _) | (_, Err(err)) => {
                tracing::error!(error = %err, "failed to install signal handlers");
                return false;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
        }
        true
    }

    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("received Ctrl+C, shutting down");
                true
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for Ctrl+C");
                false
            }
        }
    }
}

/// Counts live connections.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    count: Arc<watch::Sender<usize>>,
}

impl ConnectionTracker {
    /// Creates a tracker with no connections.
    #[must_use]
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self { count: Arc::new(count) }
    }

    /// Registers a connection until the token drops.
    #[must_use]
    pub fn acquire(&self) -> ConnectionToken {
        self.count.send_modify(|n| *n += 1);
        ConnectionToken {
            count: Arc::clone(&self.count),
        }
    }

    /// Number of live connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        *self.count.borrow()
    }

    /// Resolves once no connection is live.
    pub async fn drained(&self) {
        let mut rx = self.count.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Membership of one connection in a [`ConnectionTracker`].
#[derive(Debug)]
pub struct ConnectionToken {
    count: Arc<watch::Sender<usize>>,
}

impl Drop for ConnectionToken {
    fn drop(&mut self) {
        self.count.send_modify(|n| *n = n.saturating_sub(1));
    }
}
