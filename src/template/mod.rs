//! Page templates.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → fetcher.rs (locate and read the template for the request path)
//!     → parser.rs (split raw HTML into literals and placeholder tags)
//!     → Template (consumed once by the rewrite stream)
//! ```

pub mod fetcher;
pub mod parser;

use axum::body::Bytes;
use std::collections::BTreeMap;
use thiserror::Error;

pub use fetcher::{FsTemplateFetcher, TemplateFetcher};
pub use parser::{HtmlTagParser, TemplateParser};

/// Errors raised while loading or parsing a template.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template not found for path {0:?}")]
    NotFound(String),

    #[error("failed to read template: {0}")]
    Io(#[from] std::io::Error),

    #[error("unterminated <{tag}> tag at byte {offset}")]
    Parse { tag: String, offset: usize },

    /// Raised by custom fetchers; `presentable` becomes the 500 body.
    #[error("{message}")]
    Custom {
        message: String,
        presentable: Option<String>,
    },
}

/// Which built-in placeholder a tag stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// Inline pipe definition script.
    Pipe,
    /// End-of-body position of the deferred tail.
    Async,
}

/// Tag attributes keyed by lowercase name. Valueless attributes map to an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(BTreeMap<String, String>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into().to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Boolean attribute: true when present, unless its value is `false`.
    pub fn flag(&self, name: &str) -> bool {
        self.get(name)
            .map(|v| !v.eq_ignore_ascii_case("false"))
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attributes = Attributes::new();
        for (k, v) in iter {
            attributes.insert(k, v);
        }
        attributes
    }
}

/// One recognized tag in a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderTag {
    pub name: String,
    pub placeholder: Option<Placeholder>,
    pub attributes: Attributes,
}

impl PlaceholderTag {
    pub fn new(name: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            name: name.into(),
            placeholder: None,
            attributes,
        }
    }

    pub fn placeholder(kind: Placeholder) -> Self {
        Self {
            name: String::new(),
            placeholder: Some(kind),
            attributes: Attributes::new(),
        }
    }
}

/// A template element: raw bytes or a tag to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateNode {
    Literal(Bytes),
    Tag(PlaceholderTag),
}

/// A parsed template in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template {
    nodes: Vec<TemplateNode>,
}

impl Template {
    pub fn new(nodes: Vec<TemplateNode>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[TemplateNode] {
        &self.nodes
    }

    pub fn into_nodes(self) -> std::vec::IntoIter<TemplateNode> {
        self.nodes.into_iter()
    }
}
