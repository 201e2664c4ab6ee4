//! Per-request composition events.
//!
//! Every request gets its own [`EventEmitter`]. All request-level and
//! fragment-level lifecycle transitions go through it, tagged with the
//! request snapshot and, for fragments, the fragment index and attributes.
//! Listeners receive events synchronously and in emission order.

use axum::http::{HeaderMap, StatusCode};
use std::sync::Arc;

use crate::fragment::FragmentAttributes;
use crate::http::request::RequestInfo;

/// Lifecycle notifications of a single fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum FragmentEvent {
    /// Fetch started.
    Start,
    /// The fragment service answered with a usable response.
    Response { status: StatusCode, headers: HeaderMap },
    /// The fragment's output ended; `content_length` counts body bytes.
    End { content_length: u64 },
    /// Unrecoverable failure; output is empty.
    Error { error: String },
    /// No response head within the fragment timeout.
    Timeout,
    /// Fallback content replaced the regular response.
    Fallback { reason: String },
    /// Recoverable anomaly, no state change.
    Warn { message: String },
}

impl FragmentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            FragmentEvent::Start => "fragment:start",
            FragmentEvent::Response { .. } => "fragment:response",
            FragmentEvent::End { .. } => "fragment:end",
            FragmentEvent::Error { .. } => "fragment:error",
            FragmentEvent::Timeout => "fragment:timeout",
            FragmentEvent::Fallback { .. } => "fragment:fallback",
            FragmentEvent::Warn { .. } => "fragment:warn",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Start,
    ContextError { error: String },
    Response { status: StatusCode, headers: HeaderMap },
    End { content_length: u64 },
    Error { error: String },
    Fragment {
        index: usize,
        attributes: Arc<FragmentAttributes>,
        event: FragmentEvent,
    },
}

/// An event together with the request it belongs to.
#[derive(Debug, Clone)]
pub struct ComposeEvent {
    pub request: Arc<RequestInfo>,
    pub kind: EventKind,
}

impl ComposeEvent {
    /// Wire name: `start`, `response`, `fragment:end`, ...
    pub fn name(&self) -> &'static str {
        match &self.kind {
            EventKind::Start => "start",
            EventKind::ContextError { .. } => "context:error",
            EventKind::Response { .. } => "response",
            EventKind::End { .. } => "end",
            EventKind::Error { .. } => "error",
            EventKind::Fragment { event, .. } => event.name(),
        }
    }
}

/// Receiver of composition events.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &ComposeEvent);
}

/// Forwards every event to each inner listener in order.
#[derive(Clone, Default)]
pub struct Listeners(Vec<Arc<dyn EventListener>>);

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.0.push(listener);
        self
    }
}

impl EventListener for Listeners {
    fn on_event(&self, event: &ComposeEvent) {
        for listener in &self.0 {
            listener.on_event(event);
        }
    }
}

/// Request-scoped handle used to emit events.
#[derive(Clone)]
pub struct EventEmitter {
    request: Arc<RequestInfo>,
    listener: Arc<dyn EventListener>,
}

impl EventEmitter {
    pub fn new(request: Arc<RequestInfo>, listener: Arc<dyn EventListener>) -> Self {
        Self { request, listener }
    }

    pub fn request(&self) -> &Arc<RequestInfo> {
        &self.request
    }

    pub fn emit(&self, kind: EventKind) {
        let event = ComposeEvent {
            request: Arc::clone(&self.request),
            kind,
        };
        self.listener.on_event(&event);
    }

    pub fn fragment(&self, index: usize, attributes: &Arc<FragmentAttributes>, event: FragmentEvent) {
        self.emit(EventKind::Fragment {
            index,
            attributes: Arc::clone(attributes),
            event,
        });
    }
}

/// Logs each event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingListener;

impl EventListener for TracingListener {
    fn on_event(&self, event: &ComposeEvent) {
        let request_id = event.request.request_id.as_str();
        let path = event.request.path();
        let name = event.name();

        match &event.kind {
            EventKind::Start => {
                tracing::debug!(request_id, path, event = name, "Composition started");
            }
            EventKind::ContextError { error } => {
                tracing::warn!(request_id, path, event = name, error = %error, "Context fetch failed, using empty context");
            }
            EventKind::Response { status, .. } => {
                tracing::info!(request_id, path, event = name, status = status.as_u16(), "Response head written");
            }
            EventKind::End { content_length } => {
                tracing::info!(request_id, path, event = name, content_length, "Response finished");
            }
            EventKind::Error { error } => {
                tracing::error!(request_id, path, event = name, error = %error, "Composition failed");
            }
            EventKind::Fragment { index, attributes, event: fragment } => {
                let src = attributes.src.as_str();
                match fragment {
                    FragmentEvent::Error { error } => {
                        tracing::warn!(request_id, event = name, index, src, error = %error, "Fragment failed");
                    }
                    FragmentEvent::Timeout => {
                        tracing::warn!(request_id, event = name, index, src, "Fragment timed out");
                    }
                    FragmentEvent::Warn { message } => {
                        tracing::warn!(request_id, event = name, index, src, message = %message, "Fragment warning");
                    }
                    FragmentEvent::Response { status, .. } => {
                        tracing::debug!(request_id, event = name, index, src, status = status.as_u16(), "Fragment responded");
                    }
                    _ => {
                        tracing::debug!(request_id, event = name, index, src, "Fragment event");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records events for assertions.
    #[derive(Default)]
    pub struct RecordingListener {
        events: Mutex<Vec<ComposeEvent>>,
    }

    impl RecordingListener {
        pub fn events(&self) -> Vec<ComposeEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn names(&self) -> Vec<&'static str> {
            self.events().iter().map(ComposeEvent::name).collect()
        }

        pub fn count(&self, name: &str) -> usize {
            self.names().into_iter().filter(|n| *n == name).count()
        }
    }

    impl EventListener for RecordingListener {
        fn on_event(&self, event: &ComposeEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }
}
