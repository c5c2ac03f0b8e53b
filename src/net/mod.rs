//! TCP plumbing shared by the compute server and the caching proxy.

pub mod connections;
pub mod listener;

pub use connections::{ConnectionConfig, ConnectionGuard, ConnectionPool, DEFAULT_MAX_CONNECTIONS};
pub use listener::{serve, FrameService, ListenerConfig, DEFAULT_IDLE_TIMEOUT};
