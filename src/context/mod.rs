//! Request context.
//!
//! The context is a JSON object fetched once per request. Entries keyed by a
//! fragment `id` override that fragment's tag attributes, which is how a
//! context service switches fragment sources per locale or user segment.
//!
//! Context failures are never fatal: the orchestrator substitutes an empty
//! context and reports a `context:error` event.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

use crate::config::ContextConfig;
use crate::http::request::{RequestInfo, X_REQUEST_ID};
use crate::template::Attributes;

const MAX_CONTEXT_BYTES: usize = 256 * 1024;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("context request failed: {0}")]
    Request(String),

    #[error("context service answered {0}")]
    Status(u16),

    #[error("context fetch timed out")]
    Timeout,

    #[error("context is not a JSON object: {0}")]
    Decode(String),
}

/// Per-request parameters for fragment resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context(Map<String, Value>);

impl Context {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> Result<Self, ContextError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(ContextError::Decode(format!("got {}", type_name(&other)))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Tag attributes with the overrides stored under `id` applied.
    pub fn apply_overrides(&self, id: Option<&str>, attributes: &Attributes) -> Attributes {
        let mut merged = attributes.clone();
        let Some(Value::Object(overrides)) = id.and_then(|id| self.0.get(id)) else {
            return merged;
        };
        for (name, value) in overrides {
            match value {
                Value::String(s) => merged.insert(name.clone(), s.clone()),
                Value::Bool(b) => merged.insert(name.clone(), b.to_string()),
                Value::Number(n) => merged.insert(name.clone(), n.to_string()),
                _ => {}
            }
        }
        merged
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Source of the per-request context.
#[async_trait]
pub trait ContextFetcher: Send + Sync {
    async fn fetch(&self, request: &RequestInfo) -> Result<Context, ContextError>;
}

/// Always yields an empty context.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyContext;

#[async_trait]
impl ContextFetcher for EmptyContext {
    async fn fetch(&self, _request: &RequestInfo) -> Result<Context, ContextError> {
        Ok(Context::empty())
    }
}

/// Fetches the context as JSON from an HTTP endpoint.
///
/// The inbound path is passed along as `x-request-uri` so the service can
/// vary the context per page.
#[derive(Clone)]
pub struct HttpContextFetcher {
    url: String,
    timeout: Duration,
    client: Client<HttpConnector, Body>,
}

impl HttpContextFetcher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            url: url.into(),
            timeout,
            client,
        }
    }

    pub fn from_config(config: &ContextConfig) -> Option<Self> {
        config
            .url
            .as_ref()
            .map(|url| Self::new(url.clone(), Duration::from_millis(config.timeout_ms)))
    }

    async fn request(&self, request: &RequestInfo) -> Result<Context, ContextError> {
        let outbound = Request::builder()
            .method("GET")
            .uri(&self.url)
            .header(header::ACCEPT, "application/json")
            .header("x-request-uri", request.uri.to_string())
            .header(X_REQUEST_ID, request.request_id.as_str())
            .body(Body::empty())
            .map_err(|e| ContextError::Request(e.to_string()))?;

        let response = self
            .client
            .request(outbound)
            .await
            .map_err(|e| ContextError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ContextError::Status(response.status().as_u16()));
        }

        let bytes = axum::body::to_bytes(Body::new(response.into_body()), MAX_CONTEXT_BYTES)
            .await
            .map_err(|e| ContextError::Request(e.to_string()))?;
        let value: Value =
            serde_json::from_slice(&bytes).map_err(|e| ContextError::Decode(e.to_string()))?;
        Context::from_value(value)
    }
}

#[async_trait]
impl ContextFetcher for HttpContextFetcher {
    async fn fetch(&self, request: &RequestInfo) -> Result<Context, ContextError> {
        tokio::time::timeout(self.timeout, self.request(request))
            .await
            .map_err(|_| ContextError::Timeout)?
    }
}
