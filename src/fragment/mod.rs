//! Fragments: remotely rendered regions of a page.
//!
//! # Data Flow
//! ```text
//! PlaceholderTag + Context
//!     → FragmentAttributes (context overrides applied)
//!     → unit.rs FragmentUnit (lifecycle state machine, runs in its own task)
//!         → client.rs FragmentClient (network fetch)
//!         → pipe.rs (client-side relocation scripts)
//!     → FragmentOutput (inline stream + optional deferred stream)
//! ```

pub mod client;
pub mod pipe;
pub mod unit;

use axum::http::HeaderName;
use std::time::Duration;
use thiserror::Error;

use crate::config::{FragmentConfig, TimeoutConfig};
use crate::context::Context;
use crate::template::{Attributes, PlaceholderTag};

pub use client::{ByteStream, FragmentClient, FragmentRequest, FragmentResponse, HyperFragmentClient};
pub use unit::{FragmentOutput, FragmentState, FragmentUnit, PrimaryOutcome};

/// Errors raised while fetching a fragment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FragmentError {
    #[error("invalid fragment url {0:?}")]
    InvalidUrl(String),

    #[error("fragment request failed: {0}")]
    Request(String),

    #[error("fragment answered {0}")]
    Status(u16),

    #[error("fragment body failed: {0}")]
    Body(String),

    #[error("fragment timed out after {0:?}")]
    Timeout(Duration),
}

/// Fetch settings shared by every fragment of every request.
#[derive(Debug, Clone)]
pub struct FragmentSettings {
    pub timeout: Duration,
    /// Cap for per-tag `timeout` attributes: the request budget.
    pub max_timeout: Duration,
    pub max_body_bytes: u64,
    pub forward_headers: Vec<HeaderName>,
}

impl FragmentSettings {
    pub fn from_config(config: &FragmentConfig, timeouts: &TimeoutConfig) -> Self {
        let forward_headers = config
            .forward_headers
            .iter()
            .filter_map(|name| match HeaderName::from_bytes(name.as_bytes()) {
                Ok(name) => Some(name),
                Err(_) => {
                    tracing::warn!(header = %name, "Ignoring invalid forward header name");
                    None
                }
            })
            .collect();

        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            max_timeout: timeouts.request_budget(),
            max_body_bytes: config.max_body_bytes,
            forward_headers,
        }
    }
}

impl Default for FragmentSettings {
    fn default() -> Self {
        Self::from_config(&FragmentConfig::default(), &TimeoutConfig::default())
    }
}

/// Resolved attributes of one fragment tag.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentAttributes {
    pub id: Option<String>,
    /// Fragment URL (`src`, or `url` as an alias).
    pub src: String,
    pub primary: bool,
    pub is_async: bool,
    pub timeout: Duration,
    pub fallback_src: Option<String>,
    /// Inline markup used when both the fragment and `fallback_src` fail.
    pub fallback: Option<String>,
    /// All tag attributes after context overrides.
    pub raw: Attributes,
}

impl FragmentAttributes {
    /// Apply context overrides to `tag` and read the well-known attributes.
    pub fn resolve(tag: &PlaceholderTag, context: &Context, default_timeout: Duration) -> Self {
        let id = tag.attributes.get("id").map(str::to_string);
        let raw = context.apply_overrides(id.as_deref(), &tag.attributes);

        let src = raw
            .get("src")
            .or_else(|| raw.get("url"))
            .unwrap_or_default()
            .to_string();
        let timeout = raw
            .get("timeout")
            .and_then(|t| t.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(default_timeout);
        let fallback_src = raw
            .get("fallback-src")
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let fallback = raw.get("fallback").map(str::to_string);

        Self {
            id,
            src,
            primary: raw.flag("primary"),
            is_async: raw.flag("async"),
            timeout,
            fallback_src,
            fallback,
            raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tag(attrs: &[(&str, &str)]) -> PlaceholderTag {
        PlaceholderTag::new("fragment", attrs.iter().copied().collect())
    }

    #[test]
    fn resolves_well_known_attributes() {
        let attrs = FragmentAttributes::resolve(
            &tag(&[
                ("url", "http://f1"),
                ("primary", ""),
                ("async", "false"),
                ("timeout", "150"),
                ("fallback", "n/a"),
            ]),
            &Context::empty(),
            Duration::from_secs(3),
        );

        assert_eq!(attrs.src, "http://f1");
        assert!(attrs.primary);
        assert!(!attrs.is_async);
        assert_eq!(attrs.timeout, Duration::from_millis(150));
        assert_eq!(attrs.fallback.as_deref(), Some("n/a"));
        assert_eq!(attrs.fallback_src, None);
    }

    #[test]
    fn context_overrides_src_by_id() {
        let context = Context::from_value(json!({ "nav": { "src": "http://nav-b", "async": true } })).unwrap();
        let attrs = FragmentAttributes::resolve(
            &tag(&[("id", "nav"), ("src", "http://nav-a")]),
            &context,
            Duration::from_secs(1),
        );
        assert_eq!(attrs.src, "http://nav-b");
        assert!(attrs.is_async);
        assert_eq!(attrs.timeout, Duration::from_secs(1));
    }

    #[test]
    fn invalid_forward_headers_are_dropped() {
        let config = FragmentConfig {
            forward_headers: vec!["accept-language".into(), "bad header".into()],
            ..FragmentConfig::default()
        };
        let settings = FragmentSettings::from_config(&config, &TimeoutConfig::default());
        assert_eq!(settings.forward_headers, vec![HeaderName::from_static("accept-language")]);
        assert_eq!(settings.max_timeout, Duration::from_secs(30));
    }
}
