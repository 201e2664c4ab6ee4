//! Page composition.
//!
//! # Data Flow
//! ```text
//! orchestrator.rs
//!     ├─ context fetch ─┐ (concurrently)
//!     ├─ template fetch ┘
//!     → rewrite.rs: interpret template, one Resolution per node
//!         ├─ fragment tags → FragmentUnit (fetching in background)
//!         ├─ async fragments also → deferred.rs DeferredTail
//!         └─ pipe / async placeholders, generic tags
//!     → head: status + headers, written once (ResponseHeaders is consumed)
//!     → sequential writer: segments in document order
//!     → counting.rs: forward bytes, report total at end
//!     → client
//! ```
//!
//! # Design Decisions
//! - Document order and completion order are separate: fragments fetch
//!   concurrently, the writer drains their outputs strictly in tag order
//! - Nothing after the head can change status or headers; late failures
//!   only end the body early

pub mod counting;
pub mod deferred;
pub mod orchestrator;
pub mod rewrite;

use thiserror::Error;

use crate::template::TemplateError;

pub use counting::LengthCountingStream;
pub use deferred::{DeferredTail, DeferredTailStream};
pub use orchestrator::{ComposerOptions, Orchestrator};
pub use rewrite::{NoopTagHandler, Resolution, RewriteStream, SegmentStream, TagHandler};

/// Request-level composition failure.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("template: {0}")]
    Template(#[from] TemplateError),

    #[error("tag handler: {message}")]
    Handler {
        message: String,
        /// Text safe to show the client in place of the page.
        presentable: Option<String>,
    },
}

impl ComposeError {
    pub fn handler(message: impl Into<String>) -> Self {
        ComposeError::Handler {
            message: message.into(),
            presentable: None,
        }
    }

    /// User-presentable body for a 500 written before any page bytes.
    pub fn presentable(&self) -> Option<&str> {
        match self {
            ComposeError::Template(TemplateError::Custom { presentable, .. }) => presentable.as_deref(),
            ComposeError::Handler { presentable, .. } => presentable.as_deref(),
            ComposeError::Template(_) => None,
        }
    }
}
