//! Accept loop and per-connection frame loop shared by server and proxy.
//!
//! Each accepted socket gets its own task and its own codec. Within a
//! connection, frames are answered strictly in order: read one frame, produce
//! one response, write it, repeat. Request-level failures become failure
//! frames; only a disconnect, an idle timeout or an oversized frame ends the
//! connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn, Instrument};

use super::connections::{ConnectionConfig, ConnectionPool, DEFAULT_MAX_CONNECTIONS};
use crate::protocol::{encode_frame, FramingError, LineCodec, Response, DEFAULT_MAX_FRAME_BYTES};
use crate::shutdown::{self, ShutdownCoordinator};
use crate::telemetry::{self, RequestSpan};

/// Default idle limit for client connections.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Listener settings common to the server and the proxy.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub max_connections: usize,
    pub max_frame_bytes: usize,
    /// Close a client connection after this long without a frame. None
    /// disables the limit.
    pub idle_timeout: Option<Duration>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
        }
    }
}

/// Turns request frames into response messages.
#[async_trait]
pub trait FrameService: Send + Sync + 'static {
    /// State owned by one client connection.
    type Session: Send;

    /// `"server"` or `"proxy"`; used in logs and metrics.
    fn role(&self) -> &'static str;

    fn open_session(&self) -> Self::Session;

    /// Answer one frame. `received` is when the frame was read off the socket.
    async fn respond(&self, session: &mut Self::Session, frame: Bytes, received: Instant) -> Value;
}

/// Accept connections until `shutdown` leaves the running state.
pub async fn serve<S: FrameService>(
    listener: TcpListener,
    service: Arc<S>,
    config: ListenerConfig,
    shutdown: Arc<ShutdownCoordinator>,
) {
    let role = service.role();
    let pool = Arc::new(ConnectionPool::new(ConnectionConfig {
        max_connections: config.max_connections.max(1),
    }));
    let mut stop = shutdown.subscribe();

    if let Ok(addr) = listener.local_addr() {
        info!(role, %addr, max_connections = pool.max_connections(), "listening");
    }

    loop {
        let accepted = tokio::select! {
            _ = shutdown::stopped(&mut stop) => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                warn!(role, error = %e, "accept failed");
                // Usually descriptor exhaustion; back off instead of spinning.
                tokio::time::sleep(Duration::from_millis(50)).await;
                continue;
            }
        };

        let Some(ticket) = shutdown.track() else {
            break;
        };
        let Some(guard) = pool.try_acquire_owned() else {
            warn!(role, %peer, "connection limit reached, rejecting");
            telemetry::record_rejected_connection(role);
            tokio::spawn(reject_busy(stream));
            continue;
        };

        telemetry::record_connection(role);
        let service = service.clone();
        let config = config.clone();
        tokio::spawn(async move {
            let _ticket = ticket;
            let _guard = guard;
            handle_connection(stream, peer, service, config).await;
        });
    }

    info!(role, "listener stopped accepting");
}

async fn reject_busy(stream: TcpStream) {
    let mut framed = Framed::new(stream, LineCodec::new());
    let busy = Response::failure("Server busy: too many connections").to_value();
    let _ = framed.send(encode_frame(&busy)).await;
}

async fn handle_connection<S: FrameService>(
    stream: TcpStream,
    peer: SocketAddr,
    service: Arc<S>,
    config: ListenerConfig,
) {
    let span = RequestSpan::connection(service.role(), peer);
    async move {
        debug!("connection opened");
        let mut framed = Framed::new(stream, LineCodec::with_max_frame_bytes(config.max_frame_bytes));
        let mut session = service.open_session();

        loop {
            let next = match config.idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, framed.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        info!(idle_secs = limit.as_secs(), "closing idle connection");
                        break;
                    }
                },
                None => framed.next().await,
            };

            let frame = match next {
                None => break,
                Some(Ok(frame)) => frame,
                Some(Err(FramingError::FrameTooLarge { size, max })) => {
                    warn!(size, max, "frame too large, closing connection");
                    let error = FramingError::FrameTooLarge { size, max };
                    let _ = framed
                        .send(encode_frame(&Response::failure(error.to_string()).to_value()))
                        .await;
                    break;
                }
                Some(Err(e)) => {
                    debug!(error = %e, "read failed");
                    break;
                }
            };

            let received = Instant::now();
            let response = service.respond(&mut session, frame, received).await;
            let ok = response.get("ok") == Some(&Value::Bool(true));
            telemetry::record_request(service.role(), ok);

            if let Err(e) = framed.send(encode_frame(&response)).await {
                debug!(error = %e, "write failed");
                break;
            }
        }
        debug!("connection closed");
    }
    .instrument(span)
    .await
}
