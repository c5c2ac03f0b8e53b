//! Connection limiting with RAII guards.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Default cap on concurrently served connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 64;

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub max_connections: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

/// Counts live connections against a fixed limit.
pub struct ConnectionPool {
    active: AtomicUsize,
    config: ConnectionConfig,
}

impl ConnectionPool {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            active: AtomicUsize::new(0),
            config,
        }
    }

    /// Try to take a slot for a spawned connection task.
    pub fn try_acquire_owned(self: &Arc<Self>) -> Option<ConnectionGuard> {
        loop {
            let current = self.active.load(Ordering::Relaxed);
            if current >= self.config.max_connections {
                return None;
            }
            if self
                .active
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
            {
                return Some(ConnectionGuard { pool: self.clone() });
            }
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    pub fn max_connections(&self) -> usize {
        self.config.max_connections
    }

    fn release(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Releases its slot on drop.
pub struct ConnectionGuard {
    pool: Arc<ConnectionPool>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.pool.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_until_full() {
        let pool = Arc::new(ConnectionPool::new(ConnectionConfig { max_connections: 2 }));
        let g1 = pool.try_acquire_owned();
        let g2 = pool.try_acquire_owned();
        assert!(g1.is_some() && g2.is_some());
        assert!(pool.try_acquire_owned().is_none());
        assert_eq!(pool.active_count(), 2);

        drop(g1);
        assert_eq!(pool.active_count(), 1);
        assert!(pool.try_acquire_owned().is_some());
    }
}
