//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, graceful shutdown)
//!     → request.rs (add request ID, snapshot the request)
//!     → compose::Orchestrator (build the page)
//!     → response.rs (fixed headers, committed head)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestInfo, X_REQUEST_ID};
pub use response::ResponseHeaders;
pub use server::HttpServer;
