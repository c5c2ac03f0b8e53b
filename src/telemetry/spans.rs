//! Span utilities for connection and request tracing.

use std::net::SocketAddr;

use tracing::{info_span, Span};

/// Extension trait for recording outcomes into spans.
pub trait SpanExt {
    /// Record the outcome of a request into the span.
    fn record_outcome(&self, ok: bool, from_cache: bool, took_ms: u64);
}

impl SpanExt for Span {
    fn record_outcome(&self, ok: bool, from_cache: bool, took_ms: u64) {
        self.record("status", if ok { "ok" } else { "error" });
        self.record("from_cache", from_cache);
        self.record("latency_ms", took_ms);
    }
}

/// Factory for standardized spans.
pub struct RequestSpan;

impl RequestSpan {
    /// Span covering one accepted connection.
    ///
    /// `role` is `"server"` or `"proxy"`; `conn_id` is a fresh UUID.
    pub fn connection(role: &'static str, peer: SocketAddr) -> Span {
        info_span!(
            "connection",
            role = role,
            peer = %peer,
            conn_id = %uuid::Uuid::new_v4(),
        )
    }

    /// Span covering one request frame. Outcome fields are filled in by
    /// [`SpanExt::record_outcome`].
    pub fn request(mode: &str) -> Span {
        info_span!(
            "request",
            mode = %mode,
            status = tracing::field::Empty,
            from_cache = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    }
}
