//! Cache-or-forward dispatch for the proxy.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, warn};

use super::upstream::{Upstream, UpstreamConfig};
use crate::cache::LruStore;
use crate::net::FrameService;
use crate::protocol::{cache_disabled, cache_key, elapsed_ms, rewrite_provenance, Response};
use crate::telemetry;

/// Shared proxy state: the response cache and where to forward misses.
pub struct ProxyHandler {
    cache: LruStore<Arc<Value>>,
    upstream: UpstreamConfig,
}

impl ProxyHandler {
    pub fn new(cache_size: usize, upstream: UpstreamConfig) -> Self {
        Self {
            cache: LruStore::named("proxy", cache_size),
            upstream,
        }
    }

    pub fn cache(&self) -> &LruStore<Arc<Value>> {
        &self.cache
    }

    /// Answer one frame, forwarding through `upstream` on a miss.
    pub async fn handle(&self, upstream: &mut Upstream, frame: Bytes, received: Instant) -> Value {
        let request: Value = match serde_json::from_slice(&frame) {
            Ok(request) => request,
            Err(e) => {
                return Response::failure(format!("Proxy malformed request: {}", e)).to_value()
            }
        };

        let key = cache_key(&request);
        let cacheable = !cache_disabled(&request);

        if cacheable {
            if let Some(stored) = self.cache.get(&key) {
                return rewrite_provenance(&stored, true, elapsed_ms(received));
            }
        }

        let response = match upstream.forward(&frame).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, upstream = %self.upstream.addr, "upstream request failed");
                telemetry::record_upstream_error();
                return Response::failure(format!("Proxy could not reach server: {}", e))
                    .to_value();
            }
        };

        let rewritten = rewrite_provenance(&response, false, elapsed_ms(received));
        if cacheable && response.get("ok") == Some(&Value::Bool(true)) {
            self.cache.set(key, Arc::new(response));
        } else {
            debug!("upstream response not cached");
        }
        rewritten
    }
}

#[async_trait]
impl FrameService for ProxyHandler {
    type Session = Upstream;

    fn role(&self) -> &'static str {
        "proxy"
    }

    fn open_session(&self) -> Upstream {
        Upstream::new(self.upstream.clone())
    }

    async fn respond(&self, upstream: &mut Upstream, frame: Bytes, received: Instant) -> Value {
        self.handle(upstream, frame, received).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::net::SocketAddr;

    fn unreachable_upstream() -> UpstreamConfig {
        // Port 1 on loopback refuses connections on any sane test host.
        UpstreamConfig::new(SocketAddr::from(([127, 0, 0, 1], 1)))
    }

    #[tokio::test]
    async fn test_malformed_request_never_forwards() {
        let handler = ProxyHandler::new(4, unreachable_upstream());
        let mut upstream = handler.open_session();

        let response = handler
            .handle(&mut upstream, Bytes::from_static(b"{oops"), Instant::now())
            .await;
        assert_eq!(response["ok"], false);
        assert!(response["error"]
            .as_str()
            .unwrap()
            .starts_with("Proxy malformed request: "));
        assert!(!upstream.is_connected());
    }

    #[tokio::test]
    async fn test_hit_is_served_without_upstream() {
        let handler = ProxyHandler::new(4, unreachable_upstream());
        let request = json!({"mode": "calc", "data": {"expr": "6*7"}, "options": {"cache": true}});
        handler.cache().set(
            cache_key(&request),
            Arc::new(json!({"ok": true, "result": 42, "meta": {"from_cache": false, "took_ms": 5}})),
        );

        let mut upstream = handler.open_session();
        let frame = Bytes::from(serde_json::to_vec(&request).unwrap());
        let response = handler.handle(&mut upstream, frame, Instant::now()).await;

        assert_eq!(response["result"], 42);
        assert_eq!(response["meta"]["from_cache"], true);
        assert!(!upstream.is_connected());

        // The stored copy keeps the upstream's provenance.
        let stored = handler.cache().get(&cache_key(&request)).unwrap();
        assert_eq!(stored["meta"]["from_cache"], false);
        assert_eq!(stored["meta"]["took_ms"], 5);
    }

    #[tokio::test]
    async fn test_key_ignores_field_order() {
        let handler = ProxyHandler::new(4, unreachable_upstream());
        handler.cache().set(
            cache_key(&json!({"mode": "calc", "data": {"expr": "1+1"}})),
            Arc::new(json!({"ok": true, "result": 2.0, "meta": {"from_cache": false, "took_ms": 0}})),
        );

        let mut upstream = handler.open_session();
        let frame = Bytes::from_static(br#"{"data":{"expr":"1+1"},"mode":"calc"}"#);
        let response = handler.handle(&mut upstream, frame, Instant::now()).await;
        assert_eq!(response["meta"]["from_cache"], true);
    }

    #[tokio::test]
    async fn test_upstream_down_is_reported() {
        let handler = ProxyHandler::new(4, unreachable_upstream());
        let mut upstream = handler.open_session();
        let frame = Bytes::from_static(br#"{"mode":"calc","data":{"expr":"1+1"}}"#);

        let response = handler.handle(&mut upstream, frame, Instant::now()).await;
        assert_eq!(response["ok"], false);
        assert!(response["error"]
            .as_str()
            .unwrap()
            .starts_with("Proxy could not reach server: "));
        assert!(response.get("meta").is_none());
        assert!(handler.cache().is_empty());
    }
}
