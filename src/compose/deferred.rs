//! Deferred tail for asynchronous fragments.
//!
//! Async fragments do not hold up the document. Each one is collected in the
//! background and appended to the tail as soon as it completes, so the tail
//! is ordered by completion, not by tag position. The tail itself is emitted
//! at the `async` placeholder (just before `</body>`), and only ends once
//! the orchestrator has closed it and every written fragment has finished.

use axum::body::Bytes;
use futures_util::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::fragment::unit::OutputStream;

/// Write side of the tail, owned by the orchestrator for one request.
#[derive(Debug)]
pub struct DeferredTail {
    tx: Option<mpsc::UnboundedSender<Bytes>>,
    reader: Option<DeferredTailStream>,
}

impl DeferredTail {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Some(tx),
            reader: Some(DeferredTailStream {
                inner: UnboundedReceiverStream::new(rx),
            }),
        }
    }

    /// Add a sub-stream. Its full output is appended once it ends.
    /// Writes after [`close`](Self::close) are dropped.
    pub fn write(&self, output: OutputStream) {
        let Some(tx) = self.tx.clone() else {
            tracing::warn!("Deferred tail already closed, dropping async fragment output");
            return;
        };
        tokio::spawn(async move {
            let block = output
                .fold(Vec::new(), |mut acc, chunk| async move {
                    acc.extend_from_slice(&chunk);
                    acc
                })
                .await;
            if !block.is_empty() {
                let _ = tx.send(Bytes::from(block));
            }
        });
    }

    /// No more sub-streams will be written.
    pub fn close(&mut self) {
        self.tx = None;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }

    /// The read side. Available once; later calls return `None`.
    pub fn take_reader(&mut self) -> Option<DeferredTailStream> {
        self.reader.take()
    }
}

impl Default for DeferredTail {
    fn default() -> Self {
        Self::new()
    }
}

/// Read side of the tail: completed async fragment outputs in completion order.
#[derive(Debug)]
pub struct DeferredTailStream {
    inner: UnboundedReceiverStream<Bytes>,
}

impl Stream for DeferredTailStream {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
