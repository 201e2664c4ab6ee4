//! Fragment gateway library: server-side composition of HTML pages from
//! remotely rendered fragments.

pub mod compose;
pub mod config;
pub mod context;
pub mod fragment;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod template;

pub use compose::{ComposerOptions, Orchestrator};
pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
