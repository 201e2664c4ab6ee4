//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): composed responses by status
//! - `gateway_errors_total` (counter): request-level composition errors
//! - `gateway_context_errors_total` (counter): absorbed context fetch failures
//! - `gateway_response_bytes` (histogram): body size reported at `end`
//! - `gateway_fragment_events_total` (counter): fragment events by name
//!
//! # Design Decisions
//! - Metrics are derived from the composition event stream only
//! - Prometheus exporter is optional and installed once at startup

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

use crate::observability::events::{ComposeEvent, EventKind, EventListener};

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Turns composition events into counters and histograms.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsListener;

impl EventListener for MetricsListener {
    fn on_event(&self, event: &ComposeEvent) {
        match &event.kind {
            EventKind::Response { status, .. } => {
                counter!("gateway_requests_total", "status" => status.as_u16().to_string()).increment(1);
            }
            EventKind::End { content_length } => {
                histogram!("gateway_response_bytes").record(*content_length as f64);
            }
            EventKind::Error { .. } => {
                counter!("gateway_errors_total").increment(1);
            }
            EventKind::ContextError { .. } => {
                counter!("gateway_context_errors_total").increment(1);
            }
            EventKind::Fragment { .. } => {
                counter!("gateway_fragment_events_total", "event" => event.name()).increment(1);
            }
            EventKind::Start => {}
        }
    }
}
