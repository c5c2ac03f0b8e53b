//! Authoritative compute server.
//!
//! Binds a TCP port and answers `calc` and `gpt` requests, keeping its own
//! LRU cache of computed results.

mod handler;

use std::sync::Arc;

use tokio::net::TcpListener;

use crate::net::{self, ListenerConfig};
use crate::shutdown::ShutdownCoordinator;

pub use handler::{ComputeError, ComputeHandler};

/// Serve `handler` on an already bound listener until shutdown.
pub async fn serve(
    listener: TcpListener,
    handler: Arc<ComputeHandler>,
    options: ListenerConfig,
    shutdown: Arc<ShutdownCoordinator>,
) {
    net::serve(listener, handler, options, shutdown).await
}
