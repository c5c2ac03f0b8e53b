//! Shared helpers for the loopback integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use calc_relay::completion::UnconfiguredCompletion;
use calc_relay::net::ListenerConfig;
use calc_relay::proxy::{self, ProxyHandler, UpstreamConfig};
use calc_relay::server::{self, ComputeHandler};
use calc_relay::shutdown::ShutdownCoordinator;

/// A running listener bound to an ephemeral loopback port.
pub struct Running<H> {
    pub addr: SocketAddr,
    pub handler: Arc<H>,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub task: JoinHandle<()>,
}

pub async fn start_server(cache_size: usize, config: ListenerConfig) -> Running<ComputeHandler> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(ComputeHandler::new(cache_size, Arc::new(UnconfiguredCompletion)));
    let shutdown = Arc::new(ShutdownCoordinator::new());
    let task = tokio::spawn(server::serve(
        listener,
        handler.clone(),
        config,
        shutdown.clone(),
    ));
    Running {
        addr,
        handler,
        shutdown,
        task,
    }
}

pub async fn start_proxy(cache_size: usize, upstream: SocketAddr) -> Running<ProxyHandler> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(ProxyHandler::new(cache_size, UpstreamConfig::new(upstream)));
    let shutdown = Arc::new(ShutdownCoordinator::new());
    let task = tokio::spawn(proxy::serve(
        listener,
        handler.clone(),
        ListenerConfig::default(),
        shutdown.clone(),
    ));
    Running {
        addr,
        handler,
        shutdown,
        task,
    }
}

/// Raw line-oriented client so tests see exactly what is on the wire.
pub struct WireClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl WireClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer,
        }
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Next response frame, or None once the peer has closed.
    pub async fn read_frame(&mut self) -> Option<Value> {
        let mut line = String::new();
        let read = tokio::time::timeout(Duration::from_secs(5), self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a frame")
            .ok()?;
        if read == 0 {
            return None;
        }
        assert!(line.ends_with('\n'), "frame must be newline terminated");
        Some(serde_json::from_str(&line).unwrap())
    }

    pub async fn call(&mut self, request: &Value) -> Value {
        let mut bytes = serde_json::to_vec(request).unwrap();
        bytes.push(b'\n');
        self.send_raw(&bytes).await;
        self.read_frame().await.expect("connection closed")
    }
}
