//! Tag rewrite stream.
//!
//! Interpretation and writing are two separate steps:
//!
//! 1. [`RewriteStream::interpret`] walks the template once, in document order,
//!    calling the resolver for every tag. Resolvers start work (fragment
//!    fetches, handler futures) but never wait for it. The result is a plan:
//!    one [`Resolution`] per template node.
//! 2. [`RewriteStream::into_stream`] drains that plan sequentially. A segment
//!    is only read after every segment before it has ended, so bytes of a
//!    later tag can never overtake an earlier one, no matter which fetch
//!    finished first.

use axum::body::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tokio_util::task::AbortOnDropHandle;

use crate::compose::ComposeError;
use crate::http::request::RequestInfo;
use crate::template::{PlaceholderTag, Template, TemplateNode};

/// Bytes of the composed page.
pub type SegmentStream = BoxStream<'static, Result<Bytes, ComposeError>>;

/// What a tag (or literal) turns into.
pub enum Resolution {
    Literal(Bytes),
    /// Spliced in place; forwarded chunk by chunk.
    Stream(SegmentStream),
    /// A value that is not ready yet. It runs concurrently from the moment
    /// it is resolved and is written once its turn comes.
    Pending(BoxFuture<'static, Result<Bytes, ComposeError>>),
    Empty,
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Literal(bytes) => f.debug_tuple("Literal").field(bytes).finish(),
            Resolution::Stream(_) => f.write_str("Stream(..)"),
            Resolution::Pending(_) => f.write_str("Pending(..)"),
            Resolution::Empty => f.write_str("Empty"),
        }
    }
}

/// Resolver for tags that are neither fragments nor built-in placeholders.
pub trait TagHandler: Send + Sync {
    fn handle(&self, request: &Arc<RequestInfo>, tag: &PlaceholderTag) -> Resolution;
}

/// Drops unknown tags from the output.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTagHandler;

impl TagHandler for NoopTagHandler {
    fn handle(&self, _request: &Arc<RequestInfo>, _tag: &PlaceholderTag) -> Resolution {
        Resolution::Empty
    }
}

/// Ordered segment plan produced from one template.
#[derive(Debug)]
pub struct RewriteStream {
    segments: Vec<Resolution>,
}

impl RewriteStream {
    /// Walk `template`, resolving every tag with `resolve`.
    pub fn interpret<F>(template: Template, mut resolve: F) -> Self
    where
        F: FnMut(PlaceholderTag) -> Resolution,
    {
        let segments = template
            .into_nodes()
            .map(|node| match node {
                TemplateNode::Literal(bytes) => Resolution::Literal(bytes),
                TemplateNode::Tag(tag) => match resolve(tag) {
                    Resolution::Pending(future) => spawn_pending(future),
                    other => other,
                },
            })
            .collect();

        Self { segments }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The sequential writer: every segment in document order.
    pub fn into_stream(self) -> SegmentStream {
        stream::iter(self.segments)
            .map(|segment| -> SegmentStream {
                match segment {
                    Resolution::Literal(bytes) => stream::once(async move { Ok(bytes) }).boxed(),
                    Resolution::Stream(inner) => inner,
                    Resolution::Pending(future) => stream::once(future).boxed(),
                    Resolution::Empty => stream::empty().boxed(),
                }
            })
            .flatten()
            .filter(|chunk| {
                let keep = !matches!(chunk, Ok(bytes) if bytes.is_empty());
                async move { keep }
            })
            .boxed()
    }
}

/// Start a pending value right away so it overlaps with everything else.
/// The task is aborted if its segment is dropped unread.
fn spawn_pending(future: BoxFuture<'static, Result<Bytes, ComposeError>>) -> Resolution {
    let handle = AbortOnDropHandle::new(tokio::spawn(future));
    Resolution::Pending(Box::pin(async move {
        handle
            .await
            .map_err(|e| ComposeError::handler(format!("tag task failed: {}", e)))?
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{HtmlTagParser, TemplateParser};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    fn template(raw: &str) -> Template {
        HtmlTagParser::new("fragment", &["x-slow".to_string()]).parse(raw).unwrap()
    }

    async fn render(stream: SegmentStream) -> Result<String, ComposeError> {
        let mut out = String::new();
        let mut stream = stream;
        while let Some(chunk) = stream.next().await {
            out.push_str(std::str::from_utf8(&chunk?).unwrap());
        }
        Ok(out)
    }

    fn delayed(ms: u64, text: &'static str) -> SegmentStream {
        stream::once(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(Bytes::from_static(text.as_bytes()))
        })
        .boxed()
    }

    #[tokio::test]
    async fn later_tags_never_overtake_earlier_ones() {
        let rewrite = RewriteStream::interpret(
            template("A<fragment id=1/>B<fragment id=2/>C"),
            |tag| match tag.attributes.get("id") {
                Some("1") => Resolution::Stream(delayed(60, "one")),
                Some("2") => Resolution::Stream(delayed(0, "two")),
                _ => Resolution::Empty,
            },
        );
        assert_eq!(render(rewrite.into_stream()).await.unwrap(), "AoneBtwoC");
    }

    #[tokio::test]
    async fn pending_values_start_immediately() {
        let (tx, rx) = mpsc::channel::<&'static str>(4);
        let mut tx = Some(tx);
        let rewrite = RewriteStream::interpret(template("<x-slow/>|<fragment/>"), |tag| {
            if tag.placeholder.is_some() {
                Resolution::Empty
            } else if tag.name == "x-slow" {
                let tx = tx.take().unwrap();
                Resolution::Pending(Box::pin(async move {
                    tx.send("started").await.unwrap();
                    Ok(Bytes::from_static(b"slow"))
                }))
            } else {
                Resolution::Literal(Bytes::from_static(b"frag"))
            }
        });

        // the handler future runs before anyone reads the stream
        let mut started = ReceiverStream::new(rx);
        let signal = tokio::time::timeout(Duration::from_secs(1), started.next()).await.unwrap();
        assert_eq!(signal, Some("started"));
        assert_eq!(render(rewrite.into_stream()).await.unwrap(), "slow|frag");
    }

    #[tokio::test]
    async fn dropped_plan_aborts_pending_values() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let rewrite = RewriteStream::interpret(template("<x-slow/>"), move |tag| {
            if tag.placeholder.is_some() {
                return Resolution::Empty;
            }
            let flag = flag.clone();
            Resolution::Pending(Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(Bytes::new())
            }))
        });

        drop(rewrite);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn segment_error_surfaces_after_earlier_bytes() {
        let rewrite = RewriteStream::interpret(template("ok<x-slow/>never"), |_| {
            Resolution::Stream(
                stream::iter(vec![Ok(Bytes::from_static(b"-")), Err(ComposeError::handler("boom"))]).boxed(),
            )
        });

        let mut stream = rewrite.into_stream();
        assert_eq!(&stream.next().await.unwrap().unwrap()[..], b"ok");
        assert_eq!(&stream.next().await.unwrap().unwrap()[..], b"-");
        assert!(stream.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn noop_handler_drops_tags() {
        let handler = NoopTagHandler;
        let request = RequestInfo::from_request(
            &axum::http::Request::builder().uri("/").body(axum::body::Body::empty()).unwrap(),
        );
        let rewrite = RewriteStream::interpret(template("a<x-slow/>b"), |tag| handler.handle(&request, &tag));
        // "a", tag, "b", async placeholder
        assert_eq!(rewrite.len(), 4);
        assert_eq!(render(rewrite.into_stream()).await.unwrap(), "ab");
    }
}
