//! Template loading.
//!
//! # Responsibilities
//! - Map a request path onto a template file
//! - Read it and hand the raw text to the configured parser
//!
//! # Design Decisions
//! - `/` resolves to the configured index template
//! - Paths containing `..` or empty segments never leave the template directory

use async_trait::async_trait;
use std::path::PathBuf;

use crate::config::TemplateConfig;
use crate::http::request::RequestInfo;
use crate::template::{Template, TemplateError, TemplateParser};

/// Source of page templates.
#[async_trait]
pub trait TemplateFetcher: Send + Sync {
    async fn fetch(
        &self,
        request: &RequestInfo,
        parser: &dyn TemplateParser,
    ) -> Result<Template, TemplateError>;
}

/// Loads `<directory>/<path>.html` from the local filesystem.
#[derive(Debug, Clone)]
pub struct FsTemplateFetcher {
    directory: PathBuf,
    index: String,
}

impl FsTemplateFetcher {
    pub fn new(directory: impl Into<PathBuf>, index: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            index: index.into(),
        }
    }

    pub fn from_config(config: &TemplateConfig) -> Self {
        Self::new(&config.directory, &config.index)
    }

    /// File backing `path`, or `None` if the path tries to escape the directory.
    fn template_path(&self, path: &str) -> Option<PathBuf> {
        let trimmed = path.trim_matches('/');
        let name = if trimmed.is_empty() { self.index.as_str() } else { trimmed };

        let mut file = self.directory.clone();
        for segment in name.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
                return None;
            }
            file.push(segment);
        }
        file.set_extension("html");
        Some(file)
    }
}

#[async_trait]
impl TemplateFetcher for FsTemplateFetcher {
    async fn fetch(
        &self,
        request: &RequestInfo,
        parser: &dyn TemplateParser,
    ) -> Result<Template, TemplateError> {
        let path = request.path();
        let file = self
            .template_path(path)
            .ok_or_else(|| TemplateError::NotFound(path.to_string()))?;

        let raw = match tokio::fs::read_to_string(&file).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TemplateError::NotFound(path.to_string()));
            }
            Err(e) => return Err(TemplateError::Io(e)),
        };

        tracing::trace!(file = %file.display(), bytes = raw.len(), "Template loaded");
        parser.parse(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::HtmlTagParser;
    use axum::body::Body;
    use axum::http::Request;

    fn request(path: &str) -> std::sync::Arc<RequestInfo> {
        RequestInfo::from_request(&Request::builder().uri(path).body(Body::empty()).unwrap())
    }

    #[test]
    fn maps_paths_to_files() {
        let fetcher = FsTemplateFetcher::new("/srv/templates", "index");
        assert_eq!(fetcher.template_path("/"), Some(PathBuf::from("/srv/templates/index.html")));
        assert_eq!(
            fetcher.template_path("/shop/cart/"),
            Some(PathBuf::from("/srv/templates/shop/cart.html"))
        );
        assert_eq!(fetcher.template_path("/../etc/passwd"), None);
        assert_eq!(fetcher.template_path("/a//b"), None);
    }

    #[tokio::test]
    async fn reads_and_parses_template() {
        let dir = std::env::temp_dir().join(format!("fragment-gateway-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("index.html"), "<p><fragment src=\"http://a\"/></p>")
            .await
            .unwrap();

        let fetcher = FsTemplateFetcher::new(&dir, "index");
        let parser = HtmlTagParser::new("fragment", &[]);
        let template = fetcher.fetch(&request("/"), &parser).await.unwrap();
        // "<p>", fragment, "</p>", async placeholder
        assert_eq!(template.nodes().len(), 4);

        let missing = fetcher.fetch(&request("/nope"), &parser).await.unwrap_err();
        assert!(matches!(missing, TemplateError::NotFound(ref p) if p == "/nope"));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
