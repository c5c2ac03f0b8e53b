//! Graceful shutdown for the server and proxy listeners.
//!
//! The accept loop watches a shutdown signal; every accepted connection holds
//! a [`ConnectionTicket`]. After the signal fires, [`ShutdownCoordinator::drain`]
//! waits for the tickets to be returned, up to a timeout.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};

/// Shutdown state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

/// Result of a drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownResult {
    Complete,
    Timeout { remaining: u32 },
}

struct Shared {
    active: AtomicU32,
    notify: Notify,
}

/// Coordinates stopping the accept loop and draining live connections.
pub struct ShutdownCoordinator {
    state: watch::Sender<ShutdownState>,
    shared: Arc<Shared>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ShutdownState::Running);
        Self {
            state,
            shared: Arc::new(Shared {
                active: AtomicU32::new(0),
                notify: Notify::new(),
            }),
        }
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    pub fn is_accepting(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Receiver that observes state changes; accept loops stop on anything
    /// other than `Running`.
    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.state.subscribe()
    }

    /// Register a live connection. Returns None once shutdown has begun.
    pub fn track(&self) -> Option<ConnectionTicket> {
        if !self.is_accepting() {
            return None;
        }
        self.shared.active.fetch_add(1, Ordering::SeqCst);
        Some(ConnectionTicket {
            shared: self.shared.clone(),
        })
    }

    pub fn active_count(&self) -> u32 {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Stop accepting and wait for live connections to finish.
    pub async fn drain(&self, timeout: Duration) -> ShutdownResult {
        self.state.send_replace(ShutdownState::Draining);
        let result = self.wait_for_drain(timeout).await;
        self.state.send_replace(ShutdownState::Stopped);
        result
    }

    async fn wait_for_drain(&self, timeout: Duration) -> ShutdownResult {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            // Register interest before re-checking the count so a ticket
            // dropped in between still wakes us.
            let notified = self.shared.notify.notified();
            let count = self.active_count();
            if count == 0 {
                return ShutdownResult::Complete;
            }

            tokio::select! {
                _ = notified => continue,
                _ = tokio::time::sleep_until(deadline) => {
                    let remaining = self.active_count();
                    if remaining == 0 {
                        return ShutdownResult::Complete;
                    }
                    return ShutdownResult::Timeout { remaining };
                }
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII handle for one live connection.
pub struct ConnectionTicket {
    shared: Arc<Shared>,
}

impl Drop for ConnectionTicket {
    fn drop(&mut self) {
        self.shared.active.fetch_sub(1, Ordering::SeqCst);
        self.shared.notify.notify_waiters();
    }
}

/// Resolves once `receiver` leaves the `Running` state (or its sender is gone).
pub async fn stopped(receiver: &mut watch::Receiver<ShutdownState>) {
    let _ = receiver
        .wait_for(|state| *state != ShutdownState::Running)
        .await;
}
