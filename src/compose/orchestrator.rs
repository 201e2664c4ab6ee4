//! Per-request composition.
//!
//! # Responsibilities
//! - Fetch context and template concurrently
//! - Turn every fragment tag into a running [`FragmentUnit`]
//! - Decide the response head from the primary fragment (or write 200 once
//!   the template has been interpreted, if there is none)
//! - Stream the assembled page, reporting its length at the end
//!
//! # Design Decisions
//! - Only the first fragment marked primary controls the head; later ones are
//!   downgraded with a `fragment:warn`
//! - A primary error ends the response with an empty 500; a primary fallback
//!   still streams the page under a 500
//! - The head is decided within the request budget; past it the request
//!   fails like a primary error
//! - Every fragment task watches a child of one per-request token. Its drop
//!   guard goes to the body writer, or is dropped with an early 500, so once
//!   the client goes away nothing keeps fetching

use axum::body::{Body, Bytes};
use axum::http::{Request, Response, StatusCode};
use futures_util::stream::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::compose::{
    ComposeError, DeferredTail, LengthCountingStream, NoopTagHandler, Resolution, RewriteStream, SegmentStream,
    TagHandler,
};
use crate::config::GatewayConfig;
use crate::context::{Context, ContextFetcher, EmptyContext, HttpContextFetcher};
use crate::fragment::{pipe, FragmentClient, FragmentSettings, FragmentUnit, HyperFragmentClient, PrimaryOutcome};
use crate::http::request::RequestInfo;
use crate::http::response::ResponseHeaders;
use crate::observability::{
    EventEmitter, EventKind, EventListener, FragmentEvent, Listeners, MetricsListener, TracingListener,
};
use crate::template::{FsTemplateFetcher, HtmlTagParser, Placeholder, PlaceholderTag, TemplateFetcher, TemplateParser};

const BODY_BUFFER_CHUNKS: usize = 32;

/// Everything a request needs besides the request itself. Shared by all requests.
#[derive(Clone)]
pub struct ComposerOptions {
    /// Tag name of fragment placeholders.
    pub fragment_tag: String,
    pub context_fetcher: Arc<dyn ContextFetcher>,
    pub template_fetcher: Arc<dyn TemplateFetcher>,
    pub parser: Arc<dyn TemplateParser>,
    /// Resolver for recognized tags that are not fragments.
    pub tag_handler: Arc<dyn TagHandler>,
    pub fragment_client: Arc<dyn FragmentClient>,
    pub fragment_settings: Arc<FragmentSettings>,
    /// Time allowed to decide the response head, template fetch included.
    pub request_budget: Duration,
    /// Generates the per-request pipe instance name.
    pub pipe_instance_name: Arc<dyn Fn() -> String + Send + Sync>,
    /// Renders the pipe definition script for an instance name.
    pub pipe_definition: Arc<dyn Fn(&str) -> Bytes + Send + Sync>,
    pub listener: Arc<dyn EventListener>,
}

impl ComposerOptions {
    pub fn from_config(config: &GatewayConfig) -> Self {
        let mut listeners = Listeners::new().with(Arc::new(TracingListener));
        if config.observability.metrics_enabled {
            listeners = listeners.with(Arc::new(MetricsListener));
        }

        let context_fetcher: Arc<dyn ContextFetcher> = match HttpContextFetcher::from_config(&config.context) {
            Some(fetcher) => Arc::new(fetcher),
            None => Arc::new(EmptyContext),
        };

        Self {
            fragment_tag: config.fragments.tag.to_ascii_lowercase(),
            context_fetcher,
            template_fetcher: Arc::new(FsTemplateFetcher::from_config(&config.templates)),
            parser: Arc::new(HtmlTagParser::new(&config.fragments.tag, &config.fragments.handled_tags)),
            tag_handler: Arc::new(NoopTagHandler),
            fragment_client: Arc::new(HyperFragmentClient::new()),
            fragment_settings: Arc::new(FragmentSettings::from_config(&config.fragments, &config.timeouts)),
            request_budget: config.timeouts.request_budget(),
            pipe_instance_name: Arc::new(pipe::instance_name),
            pipe_definition: Arc::new(pipe::definition),
            listener: Arc::new(listeners),
        }
    }
}

/// Composes pages. Cheap to clone; one instance serves every request.
#[derive(Clone)]
pub struct Orchestrator {
    options: Arc<ComposerOptions>,
}

/// Per-request resolver state, alive while the template is interpreted.
struct Resolver<'a> {
    options: &'a ComposerOptions,
    request: &'a Arc<RequestInfo>,
    context: &'a Context,
    emitter: &'a EventEmitter,
    pipe: Arc<str>,
    pipe_definition: Bytes,
    tail: &'a mut DeferredTail,
    cancel: &'a CancellationToken,
    index: usize,
    primary: Option<oneshot::Receiver<PrimaryOutcome>>,
}

impl Resolver<'_> {
    fn resolve(&mut self, tag: PlaceholderTag) -> Resolution {
        match tag.placeholder {
            Some(Placeholder::Pipe) => Resolution::Literal(self.pipe_definition.clone()),
            Some(Placeholder::Async) => match self.tail.take_reader() {
                Some(reader) => Resolution::Stream(reader.map(Ok::<Bytes, ComposeError>).boxed()),
                None => Resolution::Empty,
            },
            None if tag.name == self.options.fragment_tag => self.fragment(&tag),
            None => self.options.tag_handler.handle(self.request, &tag),
        }
    }

    fn fragment(&mut self, tag: &PlaceholderTag) -> Resolution {
        let index = self.index;
        self.index += 1;

        let mut unit = FragmentUnit::new(
            tag,
            self.context,
            index,
            &self.options.fragment_settings,
            Arc::clone(&self.pipe),
            self.emitter.clone(),
        );
        let attributes = Arc::clone(unit.attributes());

        let mut demoted = false;
        if attributes.primary {
            if self.primary.is_none() {
                self.primary = Some(unit.claim_primary());
            } else {
                demoted = true;
            }
        }

        let output = unit.fetch(
            Arc::clone(self.request),
            Arc::clone(&self.options.fragment_client),
            Arc::clone(&self.options.fragment_settings),
            self.cancel.child_token(),
        );

        if demoted {
            self.emitter.fragment(
                index,
                &attributes,
                FragmentEvent::Warn {
                    message: "primary already claimed by an earlier fragment".to_string(),
                },
            );
        }
        if let Some(deferred) = output.deferred {
            self.tail.write(deferred);
        }

        Resolution::Stream(output.inline.map(Ok::<Bytes, ComposeError>).boxed())
    }
}

impl Orchestrator {
    pub fn new(options: ComposerOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }

    pub fn options(&self) -> &ComposerOptions {
        &self.options
    }

    pub async fn handle<B>(&self, request: Request<B>) -> Response<Body> {
        self.compose(RequestInfo::from_request(&request)).await
    }

    /// Compose the page for `request`. Returns as soon as the head is decided;
    /// the body keeps streaming from a background task.
    ///
    /// `ResponseHeaders` is consumed by the one `into_response` call on each
    /// path, so the head cannot be written twice.
    pub async fn compose(&self, request: Arc<RequestInfo>) -> Response<Body> {
        let options = &*self.options;
        let emitter = EventEmitter::new(Arc::clone(&request), Arc::clone(&options.listener));
        emitter.emit(EventKind::Start);
        let deadline = Instant::now() + options.request_budget;

        let pipe_name = (options.pipe_instance_name)();
        let pipe_definition = (options.pipe_definition)(&pipe_name);
        let cancel = CancellationToken::new();
        let guard = cancel.clone().drop_guard();
        let mut headers = ResponseHeaders::new();

        let fetched = tokio::time::timeout_at(deadline, async {
            tokio::join!(
                options.context_fetcher.fetch(&request),
                options.template_fetcher.fetch(&request, options.parser.as_ref()),
            )
        })
        .await;
        let Ok((context, template)) = fetched else {
            emitter.emit(EventKind::Error {
                error: format!("template not ready within {:?}", options.request_budget),
            });
            return headers.into_response(StatusCode::INTERNAL_SERVER_ERROR, Body::empty());
        };

        let context = context.unwrap_or_else(|e| {
            emitter.emit(EventKind::ContextError { error: e.to_string() });
            Context::empty()
        });

        let template = match template {
            Ok(template) => template,
            Err(e) => {
                let error = ComposeError::from(e);
                emitter.emit(EventKind::Error { error: error.to_string() });
                let body = match error.presentable() {
                    Some(text) => Body::from(text.to_string()),
                    None => Body::empty(),
                };
                return headers.into_response(StatusCode::INTERNAL_SERVER_ERROR, body);
            }
        };

        let mut tail = DeferredTail::new();
        let (rewrite, primary) = {
            let mut resolver = Resolver {
                options,
                request: &request,
                context: &context,
                emitter: &emitter,
                pipe: Arc::from(pipe_name.as_str()),
                pipe_definition,
                tail: &mut tail,
                cancel: &cancel,
                index: 0,
                primary: None,
            };
            let rewrite = RewriteStream::interpret(template, |tag| resolver.resolve(tag));
            (rewrite, resolver.primary)
        };
        // every async fragment has been handed over by now
        tail.close();

        let status = match primary {
            None => StatusCode::OK,
            Some(rx) => match tokio::time::timeout_at(deadline, rx).await {
                Ok(Ok(PrimaryOutcome::Responded { status, headers: fragment_headers })) => {
                    headers.merge_location(&fragment_headers);
                    status
                }
                Ok(Ok(PrimaryOutcome::Fallback { reason })) => {
                    emitter.emit(EventKind::Error {
                        error: format!("primary fragment fell back: {}", reason),
                    });
                    let body = self.stream_body(rewrite.into_stream(), emitter, guard);
                    return headers.into_response(StatusCode::INTERNAL_SERVER_ERROR, body);
                }
                Ok(Ok(PrimaryOutcome::Errored { error })) => {
                    emitter.emit(EventKind::Error {
                        error: format!("primary fragment failed: {}", error),
                    });
                    return headers.into_response(StatusCode::INTERNAL_SERVER_ERROR, Body::empty());
                }
                Ok(Err(_)) => {
                    emitter.emit(EventKind::Error {
                        error: "primary fragment ended without an outcome".to_string(),
                    });
                    return headers.into_response(StatusCode::INTERNAL_SERVER_ERROR, Body::empty());
                }
                Err(_) => {
                    emitter.emit(EventKind::Error {
                        error: format!("primary fragment did not settle within {:?}", options.request_budget),
                    });
                    return headers.into_response(StatusCode::INTERNAL_SERVER_ERROR, Body::empty());
                }
            },
        };

        emitter.emit(EventKind::Response {
            status,
            headers: headers.as_map().clone(),
        });
        let body = self.stream_body(rewrite.into_stream(), emitter, guard);
        headers.into_response(status, body)
    }

    /// Drain `segments` into the response body from a background task.
    ///
    /// A segment error ends the body early (the head is already out). The
    /// writer stops as soon as the client stops reading; dropping `cancel`
    /// then stops every fragment still fetching.
    fn stream_body(&self, mut segments: SegmentStream, emitter: EventEmitter, cancel: DropGuard) -> Body {
        let (tx, rx) = mpsc::channel::<Bytes>(BODY_BUFFER_CHUNKS);
        let writer = emitter.clone();

        tokio::spawn(async move {
            let _cancel = cancel;
            loop {
                tokio::select! {
                    _ = tx.closed() => {
                        tracing::debug!(request_id = %writer.request().request_id, "Client went away, cancelling fragments");
                        break;
                    }
                    next = segments.next() => match next {
                        Some(Ok(chunk)) => {
                            if tx.send(chunk).await.is_err() {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            writer.emit(EventKind::Error { error: e.to_string() });
                            break;
                        }
                        None => break,
                    }
                }
            }
        });

        let counted = LengthCountingStream::new(ReceiverStream::new(rx), move |content_length| {
            emitter.emit(EventKind::End { content_length });
        });
        Body::from_stream(counted.map(Ok::<Bytes, Infallible>))
    }
}
