//! Telemetry: structured logging, spans and metric counters.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{record_connection, record_rejected_connection, record_request, record_upstream_error};
pub use spans::{RequestSpan, SpanExt};
