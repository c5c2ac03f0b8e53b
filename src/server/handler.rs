//! Request dispatch for the compute server.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, Instrument};

use crate::cache::LruStore;
use crate::calc::{self, CalcError};
use crate::completion::CompletionService;
use crate::net::FrameService;
use crate::protocol::{elapsed_ms, Mode, Request, Response};
use crate::telemetry::{RequestSpan, SpanExt};

/// Failure while computing a validated request.
#[derive(Error, Debug)]
pub enum ComputeError {
    #[error(transparent)]
    Calc(#[from] CalcError),
}

/// Validates, caches and computes requests. Shared by every connection.
pub struct ComputeHandler {
    cache: LruStore<Value>,
    completion: Arc<dyn CompletionService>,
}

impl ComputeHandler {
    pub fn new(cache_size: usize, completion: Arc<dyn CompletionService>) -> Self {
        Self {
            cache: LruStore::named("server", cache_size),
            completion,
        }
    }

    pub fn cache(&self) -> &LruStore<Value> {
        &self.cache
    }

    /// Answer one decoded request, timing from now.
    pub async fn handle(&self, request: Value) -> Value {
        self.handle_at(request, Instant::now()).await.to_value()
    }

    /// Answer one decoded request received at `received`.
    pub async fn handle_at(&self, request: Value, received: Instant) -> Response {
        let request = match Request::from_value(request) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "rejected request");
                return Response::failure(e.to_string());
            }
        };

        let span = RequestSpan::request(request.mode().as_str());
        async {
            let response = self.dispatch(&request, received).await;
            if let Response::Success { meta, .. } = &response {
                tracing::Span::current().record_outcome(true, meta.from_cache, meta.took_ms);
            } else {
                tracing::Span::current().record_outcome(false, false, elapsed_ms(received));
            }
            response
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, request: &Request, received: Instant) -> Response {
        let key = request.cache_key();

        if request.use_cache() {
            if let Some(cached) = self.cache.get(&key) {
                return Response::success(cached, true, elapsed_ms(received));
            }
        }

        match self.compute(request).await {
            Ok(result) => {
                if request.use_cache() {
                    self.cache.set(key, result.clone());
                }
                Response::success(result, false, elapsed_ms(received))
            }
            Err(e) => {
                debug!(error = %e, "computation failed");
                Response::failure(format!("Server error: {}", e))
            }
        }
    }

    async fn compute(&self, request: &Request) -> Result<Value, ComputeError> {
        match request.mode() {
            Mode::Calc => Ok(Value::from(calc::evaluate(request.payload())?)),
            Mode::Gpt => Ok(Value::String(self.completion.complete(request.payload()).await)),
        }
    }
}

#[async_trait]
impl FrameService for ComputeHandler {
    type Session = ();

    fn role(&self) -> &'static str {
        "server"
    }

    fn open_session(&self) -> Self::Session {}

    async fn respond(&self, _session: &mut (), frame: Bytes, received: Instant) -> Value {
        match serde_json::from_slice::<Value>(&frame) {
            Ok(request) => self.handle_at(request, received).await.to_value(),
            Err(e) => Response::failure(format!("Malformed: {}", e)).to_value(),
        }
    }
}
