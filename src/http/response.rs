//! Response head construction.
//!
//! # Responsibilities
//! - Build the fixed header set every composed page carries
//! - Merge the primary fragment's `Location` into it
//! - Turn a committed head plus a streaming body into an axum `Response`
//!
//! # Design Decisions
//! - Composed pages are never cached by browsers or proxies
//! - No `Content-Length`: the body length is only known once streaming ends

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Response, StatusCode};

/// Headers of the composed response, built up until the head is committed.
#[derive(Debug, Clone)]
pub struct ResponseHeaders {
    inner: HeaderMap,
}

impl ResponseHeaders {
    /// The fixed set: caching disabled, `text/html`.
    pub fn new() -> Self {
        let mut inner = HeaderMap::new();
        inner.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        );
        inner.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        inner.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        Self { inner }
    }

    /// Copy `Location` from a fragment response, if it has one.
    pub fn merge_location(&mut self, fragment_headers: &HeaderMap) {
        if let Some(location) = fragment_headers.get(header::LOCATION) {
            self.inner.insert(header::LOCATION, location.clone());
        }
    }

    pub fn as_map(&self) -> &HeaderMap {
        &self.inner
    }

    /// Assemble the final response. Consumes the headers: once the head is
    /// written nothing may change them.
    pub fn into_response(self, status: StatusCode, body: Body) -> Response<Body> {
        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = self.inner;
        response
    }
}

impl Default for ResponseHeaders {
    fn default() -> Self {
        Self::new()
    }
}
