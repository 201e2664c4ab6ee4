//! Network client for fragment services.
//!
//! # Responsibilities
//! - Build the outbound GET for one fragment (forwarded headers included)
//! - Perform the request and expose the body as a byte stream
//!
//! # Design Decisions
//! - Timeouts, fallbacks and status policy live in the fragment unit; the
//!   client only does I/O
//! - Bodies stream straight through, nothing is buffered here

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode};
use futures_util::stream::{BoxStream, StreamExt};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::Url;

use crate::fragment::{FragmentError, FragmentSettings};
use crate::http::request::RequestInfo;

/// Stream of body chunks from a fragment service.
pub type ByteStream = BoxStream<'static, Result<Bytes, FragmentError>>;

/// Outbound request for one fragment.
#[derive(Debug, Clone)]
pub struct FragmentRequest {
    pub url: Url,
    pub headers: HeaderMap,
}

impl FragmentRequest {
    /// Request for `src`, carrying forwarded headers from `inbound`.
    pub fn build(src: &str, inbound: &RequestInfo, settings: &FragmentSettings) -> Result<Self, FragmentError> {
        let url = Url::parse(src).map_err(|_| FragmentError::InvalidUrl(src.to_string()))?;
        if url.scheme() != "http" {
            return Err(FragmentError::InvalidUrl(src.to_string()));
        }

        let mut headers = HeaderMap::new();
        for name in &settings.forward_headers {
            if let Some(value) = inbound.headers.get(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
        if let Some(path_and_query) = inbound.uri.path_and_query() {
            if let Ok(value) = HeaderValue::from_str(path_and_query.as_str()) {
                headers.insert("x-request-uri", value);
            }
        }
        if let Some(host) = inbound.host().and_then(|h| HeaderValue::from_str(h).ok()) {
            headers.insert("x-request-host", host);
        }

        Ok(Self { url, headers })
    }
}

/// Response head plus streaming body.
pub struct FragmentResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

impl std::fmt::Debug for FragmentResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Performs fragment fetches.
#[async_trait]
pub trait FragmentClient: Send + Sync {
    async fn request(&self, request: FragmentRequest) -> Result<FragmentResponse, FragmentError>;
}

/// hyper-based client with a shared connection pool.
#[derive(Clone)]
pub struct HyperFragmentClient {
    client: Client<HttpConnector, Body>,
}

impl HyperFragmentClient {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new())
            .build(HttpConnector::new());
        Self { client }
    }
}

impl Default for HyperFragmentClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FragmentClient for HyperFragmentClient {
    async fn request(&self, request: FragmentRequest) -> Result<FragmentResponse, FragmentError> {
        let mut builder = Request::builder().method("GET").uri(request.url.as_str());
        if let Some(headers) = builder.headers_mut() {
            headers.extend(request.headers);
        }
        let outbound = builder
            .body(Body::empty())
            .map_err(|e| FragmentError::Request(e.to_string()))?;

        let response = self
            .client
            .request(outbound)
            .await
            .map_err(|e| FragmentError::Request(e.to_string()))?;

        let (parts, body) = response.into_parts();
        let body = Body::new(body)
            .into_data_stream()
            .map(|chunk| chunk.map_err(|e| FragmentError::Body(e.to_string())))
            .boxed();

        Ok(FragmentResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}
