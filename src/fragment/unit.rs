//! Fragment unit lifecycle.
//!
//! # States
//! ```text
//! Created → Fetching → Responded
//!                    → Fallback
//!                    → Errored
//!                    → TimedOut → Fallback
//!                               → Errored
//! ```
//!
//! Exactly one of `fragment:response`, `fragment:fallback` or
//! `fragment:error` fires per unit. `fragment:timeout` is reported before the
//! unit resolves through the same path as an error. `fragment:warn` may fire at
//! any time without a state change; `fragment:end` follows a response or
//! fallback once the output stream is complete.
//!
//! The fetch runs in its own task. The unit's output reaches the page through
//! a bounded channel, so a slow reader applies backpressure to the fragment
//! connection rather than buffering it.

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::fragment::pipe::{self, FragmentAssets};
use crate::fragment::{
    ByteStream, FragmentAttributes, FragmentClient, FragmentError, FragmentRequest, FragmentSettings,
};
use crate::http::request::RequestInfo;
use crate::observability::{EventEmitter, FragmentEvent};
use crate::template::PlaceholderTag;

const OUTPUT_BUFFER_CHUNKS: usize = 16;

/// Bytes a fragment contributes to the page. Never fails: errors end it early.
pub type OutputStream = BoxStream<'static, Bytes>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentState {
    Created,
    Fetching,
    Responded,
    Fallback,
    Errored,
    TimedOut,
}

impl FragmentState {
    pub fn is_terminal(self) -> bool {
        matches!(self, FragmentState::Responded | FragmentState::Fallback | FragmentState::Errored)
    }

    fn can_become(self, next: FragmentState) -> bool {
        use FragmentState::*;
        matches!(
            (self, next),
            (Created, Fetching)
                | (Fetching, Responded | Fallback | Errored | TimedOut)
                | (TimedOut, Fallback | Errored)
        )
    }
}

/// How the primary fragment settled; decides the response head.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimaryOutcome {
    Responded { status: StatusCode, headers: HeaderMap },
    Fallback { reason: String },
    Errored { error: String },
}

/// Where a fragment's bytes go.
pub struct FragmentOutput {
    /// Spliced at the tag's position.
    pub inline: OutputStream,
    /// Handed to the deferred tail (async fragments only).
    pub deferred: Option<OutputStream>,
}

/// One fragment tag occurrence of one request.
pub struct FragmentUnit {
    index: usize,
    attributes: Arc<FragmentAttributes>,
    pipe: Arc<str>,
    emitter: EventEmitter,
    state: FragmentState,
    primary: Option<oneshot::Sender<PrimaryOutcome>>,
}

impl FragmentUnit {
    pub fn new(
        tag: &PlaceholderTag,
        context: &Context,
        index: usize,
        settings: &FragmentSettings,
        pipe: Arc<str>,
        emitter: EventEmitter,
    ) -> Self {
        let mut attributes = FragmentAttributes::resolve(tag, context, settings.timeout);
        if attributes.timeout > settings.max_timeout {
            attributes.timeout = settings.max_timeout;
        }
        let attributes = Arc::new(attributes);
        Self {
            index,
            attributes,
            pipe,
            emitter,
            state: FragmentState::Created,
            primary: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn attributes(&self) -> &Arc<FragmentAttributes> {
        &self.attributes
    }

    pub fn state(&self) -> FragmentState {
        self.state
    }

    /// Make this unit report its outcome for head writing.
    pub fn claim_primary(&mut self) -> oneshot::Receiver<PrimaryOutcome> {
        let (tx, rx) = oneshot::channel();
        self.primary = Some(tx);
        rx
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(FragmentEvent::Warn { message: message.into() });
    }

    /// Start fetching in a background task. Emits `fragment:start` before
    /// returning; the rest of the template never waits on this call.
    pub fn fetch(
        mut self,
        request: Arc<RequestInfo>,
        client: Arc<dyn FragmentClient>,
        settings: Arc<FragmentSettings>,
        cancel: CancellationToken,
    ) -> FragmentOutput {
        self.transition(FragmentState::Fetching);
        self.emit(FragmentEvent::Start);

        let (tx, rx) = mpsc::channel(OUTPUT_BUFFER_CHUNKS);
        let output: OutputStream = ReceiverStream::new(rx).boxed();

        let output = if self.attributes.is_async {
            let placeholder = pipe::placeholder_script(&self.pipe, self.index);
            FragmentOutput {
                inline: stream::once(async move { placeholder }).boxed(),
                deferred: Some(output),
            }
        } else {
            FragmentOutput {
                inline: output,
                deferred: None,
            }
        };

        let index = self.index;
        let request_id = request.request_id.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = self.run(&request, client.as_ref(), &settings, tx) => {}
                _ = cancel.cancelled() => {
                    tracing::debug!(request_id = %request_id, index, "Fragment fetch cancelled");
                }
            }
        });

        output
    }

    async fn run(
        &mut self,
        request: &RequestInfo,
        client: &dyn FragmentClient,
        settings: &FragmentSettings,
        tx: mpsc::Sender<Bytes>,
    ) {
        let src = self.attributes.src.clone();
        match self.request_head(&src, request, client, settings).await {
            Ok((status, headers, body)) => {
                self.transition(FragmentState::Responded);
                self.emit(FragmentEvent::Response { status, headers: headers.clone() });
                let assets = FragmentAssets::from_headers(&headers);
                self.report(PrimaryOutcome::Responded { status, headers });
                self.forward(body, &assets, settings, &tx).await;
            }
            Err(error) => {
                if matches!(error, FragmentError::Timeout(_)) {
                    self.transition(FragmentState::TimedOut);
                    self.emit(FragmentEvent::Timeout);
                }
                self.recover(error, request, client, settings, &tx).await;
            }
        }
    }

    /// Fetch `src` up to its response head, enforcing the fragment timeout
    /// and treating 5xx as failure.
    async fn request_head(
        &self,
        src: &str,
        request: &RequestInfo,
        client: &dyn FragmentClient,
        settings: &FragmentSettings,
    ) -> Result<(StatusCode, HeaderMap, ByteStream), FragmentError> {
        let outbound = FragmentRequest::build(src, request, settings)?;
        let timeout = self.attributes.timeout;

        let response = tokio::time::timeout(timeout, client.request(outbound))
            .await
            .map_err(|_| FragmentError::Timeout(timeout))??;

        if response.status.is_server_error() {
            return Err(FragmentError::Status(response.status.as_u16()));
        }
        Ok((response.status, response.headers, response.body))
    }

    /// Try `fallback-src`, then inline fallback markup, else settle as errored.
    async fn recover(
        &mut self,
        error: FragmentError,
        request: &RequestInfo,
        client: &dyn FragmentClient,
        settings: &FragmentSettings,
        tx: &mpsc::Sender<Bytes>,
    ) {
        let reason = error.to_string();

        if let Some(fallback_src) = self.attributes.fallback_src.clone() {
            match self.request_head(&fallback_src, request, client, settings).await {
                Ok((_, headers, body)) => {
                    self.settle_fallback(reason);
                    let assets = FragmentAssets::from_headers(&headers);
                    self.forward(body, &assets, settings, tx).await;
                    return;
                }
                Err(e) => {
                    tracing::debug!(index = self.index, error = %e, "Fallback source failed");
                }
            }
        }

        if let Some(markup) = self.attributes.fallback.clone() {
            self.settle_fallback(reason);
            let body = stream::once(async move { Ok(Bytes::from(markup)) }).boxed();
            self.forward(body, &FragmentAssets::default(), settings, tx).await;
            return;
        }

        self.transition(FragmentState::Errored);
        self.emit(FragmentEvent::Error { error: reason.clone() });
        self.report(PrimaryOutcome::Errored { error: reason });
    }

    fn settle_fallback(&mut self, reason: String) {
        self.transition(FragmentState::Fallback);
        self.emit(FragmentEvent::Fallback { reason: reason.clone() });
        self.report(PrimaryOutcome::Fallback { reason });
    }

    /// Copy `body` into the output, decorated with asset links and pipe
    /// markers. A body error truncates the output and is reported as a warning.
    async fn forward(
        &self,
        mut body: ByteStream,
        assets: &FragmentAssets,
        settings: &FragmentSettings,
        tx: &mpsc::Sender<Bytes>,
    ) {
        for href in &assets.stylesheets {
            if tx.send(pipe::stylesheet_link(href)).await.is_err() {
                return;
            }
        }

        let wrapped = self.attributes.is_async || assets.script.is_some();
        if wrapped {
            let start = pipe::start_script(&self.pipe, self.index, assets.script.as_deref());
            if tx.send(start).await.is_err() {
                return;
            }
        }

        let mut content_length: u64 = 0;
        let mut warned = false;
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    content_length += bytes.len() as u64;
                    if !warned && content_length > settings.max_body_bytes {
                        warned = true;
                        self.warn(format!(
                            "response exceeds {} bytes",
                            settings.max_body_bytes
                        ));
                    }
                    if tx.send(bytes).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    self.warn(format!("body truncated: {}", e));
                    break;
                }
            }
        }

        if wrapped && tx.send(pipe::end_script(&self.pipe, self.index)).await.is_err() {
            return;
        }
        self.emit(FragmentEvent::End { content_length });
    }

    fn transition(&mut self, next: FragmentState) {
        debug_assert!(
            self.state.can_become(next),
            "invalid fragment transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }

    fn report(&mut self, outcome: PrimaryOutcome) {
        if let Some(tx) = self.primary.take() {
            let _ = tx.send(outcome);
        }
    }

    fn emit(&self, event: FragmentEvent) {
        self.emitter.fragment(self.index, &self.attributes, event);
    }
}
