//! The proxy's connection to the compute server.
//!
//! Each client connection owns one `Upstream`. It connects on the first cache
//! miss and is reused for later misses. Any failure drops the connection so
//! the next miss starts from a fresh one; nothing is retried.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use futures::{FutureExt, SinkExt, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

use crate::protocol::{FramedConnection, FramingError, LineCodec, DEFAULT_MAX_FRAME_BYTES};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub addr: SocketAddr,
    pub connect_timeout: Duration,
    /// Bound on one write-then-read exchange.
    pub read_timeout: Duration,
    pub max_frame_bytes: usize,
}

impl UpstreamConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("connect to {0} timed out")]
    ConnectTimeout(SocketAddr),

    #[error("timed out waiting for response")]
    Timeout,

    #[error("connection closed by server")]
    Closed,

    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Per-client upstream connection.
pub struct Upstream {
    config: UpstreamConfig,
    conn: Option<FramedConnection<TcpStream>>,
}

impl Upstream {
    pub fn new(config: UpstreamConfig) -> Self {
        Self { config, conn: None }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Send `frame` verbatim and read exactly one response frame.
    pub async fn forward(&mut self, frame: &Bytes) -> Result<Value, UpstreamError> {
        let result = self.exchange(frame).await;
        if result.is_err() {
            self.conn = None;
        }
        result
    }

    async fn exchange(&mut self, frame: &Bytes) -> Result<Value, UpstreamError> {
        self.discard_if_stale();
        if self.conn.is_none() {
            self.conn = Some(self.connect().await?);
        }
        let Some(conn) = self.conn.as_mut() else {
            return Err(UpstreamError::Closed);
        };

        let reply = tokio::time::timeout(self.config.read_timeout, async {
            conn.send(frame.clone()).await?;
            Ok::<_, FramingError>(conn.next().await.transpose()?)
        })
        .await
        .map_err(|_| UpstreamError::Timeout)??;

        let reply = reply.ok_or(UpstreamError::Closed)?;
        Ok(serde_json::from_slice(&reply)?)
    }

    /// A reused connection may have been closed by the server while idle, or
    /// carry bytes nobody asked for. Either way it cannot be trusted.
    fn discard_if_stale(&mut self) {
        let Some(conn) = self.conn.as_mut() else {
            return;
        };
        if let Some(unexpected) = conn.next().now_or_never() {
            match unexpected {
                None => debug!("upstream closed while idle, reconnecting"),
                Some(Err(e)) => debug!(error = %e, "upstream failed while idle, reconnecting"),
                Some(Ok(_)) => debug!("unsolicited upstream frame, reconnecting"),
            }
            self.conn = None;
        }
    }

    async fn connect(&self) -> Result<FramedConnection<TcpStream>, UpstreamError> {
        let addr = self.config.addr;
        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| UpstreamError::ConnectTimeout(addr))?
            .map_err(|source| UpstreamError::Connect { addr, source })?;
        let _ = stream.set_nodelay(true);
        debug!(%addr, "connected upstream");
        Ok(Framed::new(
            stream,
            LineCodec::with_max_frame_bytes(self.config.max_frame_bytes),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut upstream = Upstream::new(UpstreamConfig::new(addr));
        let err = upstream.forward(&Bytes::from_static(b"{}")).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Connect { .. }));
        assert!(!upstream.is_connected());
    }

    #[tokio::test]
    async fn test_reconnects_after_server_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            // Answer one frame per connection, then hang up.
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let (read, mut write) = stream.into_split();
                let mut lines = BufReader::new(read).lines();
                if lines.next_line().await.unwrap().is_some() {
                    write.write_all(b"{\"ok\":true,\"result\":1}\n").await.unwrap();
                }
            }
        });

        let mut upstream = Upstream::new(UpstreamConfig::new(addr));
        let first = upstream.forward(&Bytes::from_static(b"{}")).await.unwrap();
        assert_eq!(first["result"], 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = upstream.forward(&Bytes::from_static(b"{}")).await.unwrap();
        assert_eq!(second["result"], 1);
    }

    #[tokio::test]
    async fn test_malformed_reply_drops_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            while lines.next_line().await.unwrap().is_some() {
                write.write_all(b"not json\n").await.unwrap();
            }
        });

        let mut upstream = Upstream::new(UpstreamConfig::new(addr));
        let err = upstream.forward(&Bytes::from_static(b"{}")).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Malformed(_)));
        assert!(!upstream.is_connected());
    }
}
