//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Orchestrator + fragment units produce:
//!     → events.rs (typed per-request event channel)
//!         → TracingListener (structured log lines)
//!         → metrics.rs MetricsListener (counters, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - The event channel is the single audit trail of a composition
//! - Request ID flows through all events
//! - No global event bus: each request carries its own emitter

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{ComposeEvent, EventEmitter, EventKind, EventListener, FragmentEvent, Listeners, TracingListener};
pub use metrics::MetricsListener;
