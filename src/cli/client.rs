//! TCP client for the server and proxy ports.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::config::{ConfigError, Endpoint};
use crate::protocol::{encode_frame, FramedConnection, FramingError, LineCodec, Mode, Response};

/// Connect and per-request timeout for one-shot requests.
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("connect to {endpoint} failed: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build a request frame for `mode`.
pub fn build_request(mode: Mode, text: &str, cache: bool) -> Value {
    let mut data = serde_json::Map::new();
    data.insert(mode.payload_field().to_string(), Value::String(text.to_string()));
    json!({
        "mode": mode.as_str(),
        "data": data,
        "options": {"cache": cache},
    })
}

/// One persistent connection; requests are sent one at a time.
pub struct RelayClient {
    conn: FramedConnection<TcpStream>,
    timeout: Option<Duration>,
}

impl RelayClient {
    /// Connect to `endpoint`, giving up after `timeout`.
    pub async fn connect(endpoint: &Endpoint, timeout: Duration) -> Result<Self, ClientError> {
        let addr = endpoint.resolve().await?;
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::Timeout(timeout))?
            .map_err(|source| ClientError::Connect {
                endpoint: endpoint.to_string(),
                source,
            })?;
        let _ = stream.set_nodelay(true);
        Ok(Self {
            conn: Framed::new(stream, LineCodec::new()),
            timeout: Some(timeout),
        })
    }

    /// Bound each request by `timeout`, or wait indefinitely with `None`.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send one request and wait for its response frame.
    pub async fn request(&mut self, request: &Value) -> Result<Value, ClientError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.exchange(request))
                .await
                .map_err(|_| ClientError::Timeout(limit))?,
            None => self.exchange(request).await,
        }
    }

    async fn exchange(&mut self, request: &Value) -> Result<Value, ClientError> {
        self.conn.send(encode_frame(request)).await?;
        match self.conn.next().await {
            Some(frame) => Ok(serde_json::from_slice(&frame?)?),
            None => Ok(Response::failure("No response").to_value()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_shapes() {
        assert_eq!(
            build_request(Mode::Calc, "2+2", true),
            json!({"mode": "calc", "data": {"expr": "2+2"}, "options": {"cache": true}})
        );
        assert_eq!(
            build_request(Mode::Gpt, "hi", false),
            json!({"mode": "gpt", "data": {"prompt": "hi"}, "options": {"cache": false}})
        );
    }

    #[tokio::test]
    async fn test_closed_stream_is_no_response() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            use tokio::io::AsyncBufReadExt;
            // Read the request, then hang up without answering.
            let (stream, _) = listener.accept().await.unwrap();
            let mut lines = tokio::io::BufReader::new(stream).lines();
            let _ = lines.next_line().await;
        });

        let mut client = RelayClient::connect(&Endpoint::new("127.0.0.1", port), DEFAULT_CLIENT_TIMEOUT)
            .await
            .unwrap();
        let response = client
            .request(&build_request(Mode::Calc, "1", true))
            .await
            .unwrap();
        assert_eq!(response, json!({"ok": false, "error": "No response"}));
    }
}
