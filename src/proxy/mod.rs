//! Transparent caching proxy in front of the compute server.
//!
//! Cached responses are replayed with `meta.from_cache = true`; misses are
//! forwarded verbatim over the client's own upstream connection. Keys are the
//! same canonical request serialization the server uses, so a proxy hit is
//! exactly what the server would have answered from its own cache.

mod handler;
mod upstream;

use std::sync::Arc;

use tokio::net::TcpListener;

use crate::net::{self, ListenerConfig};
use crate::shutdown::ShutdownCoordinator;

pub use handler::ProxyHandler;
pub use upstream::{
    Upstream, UpstreamConfig, UpstreamError, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT,
};

/// Serve `handler` on an already bound listener until shutdown.
pub async fn serve(
    listener: TcpListener,
    handler: Arc<ProxyHandler>,
    options: ListenerConfig,
    shutdown: Arc<ShutdownCoordinator>,
) {
    net::serve(listener, handler, options, shutdown).await
}
