//! Counters emitted through the `metrics` facade.
//!
//! No recorder is installed by this crate; embedders that want the numbers
//! install one before starting a listener.

pub fn record_connection(role: &'static str) {
    metrics::counter!("calc_relay_connections_total", "role" => role).increment(1);
}

pub fn record_rejected_connection(role: &'static str) {
    metrics::counter!("calc_relay_connections_rejected_total", "role" => role).increment(1);
}

pub fn record_request(role: &'static str, ok: bool) {
    let status = if ok { "ok" } else { "error" };
    metrics::counter!("calc_relay_requests_total", "role" => role, "status" => status)
        .increment(1);
}

pub fn record_upstream_error() {
    metrics::counter!("calc_relay_upstream_errors_total").increment(1);
}
