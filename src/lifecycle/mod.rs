//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Process (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger → server stops accepting → drain
//!
//! Request (compose/orchestrator.rs):
//!     client disconnects / handler dropped → request token's drop guard fires
//!     → every fragment task of that request stops
//! ```
//!
//! # Design Decisions
//! - In-flight responses drain on shutdown; no new requests are accepted
//! - Cancellation is scoped per request, never global

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
