//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the fragment gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Where page templates are loaded from.
    pub templates: TemplateConfig,

    /// Fragment tag recognition and fetch behaviour.
    pub fragments: FragmentConfig,

    /// Request context source.
    pub context: ContextConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Template storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Directory holding `*.html` templates.
    pub directory: String,

    /// Template name served for `/`.
    pub index: String,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            directory: "templates".to_string(),
            index: "index".to_string(),
        }
    }
}

/// Fragment configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FragmentConfig {
    /// Tag name marking a fragment placeholder (e.g. `<fragment src=.../>`).
    pub tag: String,

    /// Default time allowed for a fragment to answer with its head, in milliseconds.
    pub timeout_ms: u64,

    /// Body size above which a `fragment:warn` event is emitted.
    pub max_body_bytes: u64,

    /// Inbound request headers copied onto every fragment request.
    pub forward_headers: Vec<String>,

    /// Additional tag names handed to the generic tag handler.
    pub handled_tags: Vec<String>,
}

impl Default for FragmentConfig {
    fn default() -> Self {
        Self {
            tag: "fragment".to_string(),
            timeout_ms: 3000,
            max_body_bytes: 1024 * 1024,
            forward_headers: vec![
                "accept-language".to_string(),
                "referer".to_string(),
                "user-agent".to_string(),
                "x-request-id".to_string(),
            ],
            handled_tags: Vec::new(),
        }
    }
}

/// Context source configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ContextConfig {
    /// JSON endpoint returning the per-request context. `None` means empty context.
    pub url: Option<String>,

    /// Context fetch timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: 1000,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed to produce the response head, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

impl TimeoutConfig {
    /// Upper bound for deciding the response head.
    pub fn request_budget(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
