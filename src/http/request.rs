//! Inbound request snapshot and request ID handling.
//!
//! # Responsibilities
//! - Attach a unique request ID (UUID v4) to every inbound request
//! - Capture the read-only view of the request that composition needs
//!   (method, URI, headers, request ID)
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - The snapshot is shared via Arc across the fragment tasks of one request;
//!   the original body is never read

use axum::http::{HeaderMap, HeaderName, Method, Request, Uri};
use std::sync::Arc;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

/// Header carrying the request correlation ID.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Layer assigning an `x-request-id` to requests that arrive without one.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid)
}

/// Layer copying the request's `x-request-id` onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(X_REQUEST_ID)
}

/// Immutable view of an inbound request.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub request_id: String,
}

impl RequestInfo {
    /// Snapshot the parts of `request` needed for composition.
    pub fn from_request<B>(request: &Request<B>) -> Arc<Self> {
        let request_id = request
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        Arc::new(Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            headers: request.headers().clone(),
            request_id,
        })
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Value of `Host`, falling back to the URI authority.
    pub fn host(&self) -> Option<&str> {
        self.headers
            .get(axum::http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| self.uri.authority().map(|a| a.as_str()))
    }
}
