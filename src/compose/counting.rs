use axum::body::Bytes;
use futures_util::stream::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

type OnEnd = Box<dyn FnOnce(u64) + Send>;

/// Forwards chunks unchanged and reports the total byte count once the inner
/// stream ends.
pub struct LengthCountingStream<S> {
    inner: S,
    count: u64,
    on_end: Option<OnEnd>,
}

impl<S> LengthCountingStream<S>
where
    S: Stream<Item = Bytes> + Unpin,
{
    pub fn new(inner: S, on_end: impl FnOnce(u64) + Send + 'static) -> Self {
        Self {
            inner,
            count: 0,
            on_end: Some(Box::new(on_end)),
        }
    }

    /// Bytes forwarded so far.
    pub fn bytes_forwarded(&self) -> u64 {
        self.count
    }
}

impl<S> Stream for LengthCountingStream<S>
where
    S: Stream<Item = Bytes> + Unpin,
{
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(chunk)) => {
                self.count += chunk.len() as u64;
                Poll::Ready(Some(chunk))
            }
            Poll::Ready(None) => {
                if let Some(on_end) = self.on_end.take() {
                    on_end(self.count);
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S> std::fmt::Debug for LengthCountingStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LengthCountingStream")
            .field("count", &self.count)
            .field("ended", &self.on_end.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream::{self, StreamExt};
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn forwards_chunks_and_reports_total_once() {
        let total = Arc::new(AtomicU64::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let (t, c) = (total.clone(), calls.clone());

        let chunks = vec![Bytes::from_static(b"abc"), Bytes::from_static(b""), Bytes::from_static(b"de")];
        let mut counted = LengthCountingStream::new(stream::iter(chunks.clone()), move |n| {
            t.store(n, Ordering::SeqCst);
            c.fetch_add(1, Ordering::SeqCst);
        });

        let mut seen = Vec::new();
        while let Some(chunk) = counted.next().await {
            seen.push(chunk);
        }
        // polling past the end must not fire again
        assert!(counted.next().await.is_none());

        assert_eq!(seen, chunks);
        assert_eq!(counted.bytes_forwarded(), 5);
        assert_eq!(total.load(Ordering::SeqCst), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_stream_reports_zero() {
        let total = Arc::new(AtomicU64::new(u64::MAX));
        let t = total.clone();
        let counted = LengthCountingStream::new(stream::empty::<Bytes>(), move |n| t.store(n, Ordering::SeqCst));
        let collected: Vec<Bytes> = counted.collect().await;
        assert!(collected.is_empty());
        assert_eq!(total.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dropped_before_end_never_reports() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let mut counted = LengthCountingStream::new(
            stream::iter(vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]),
            move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            },
        );
        counted.next().await;
        drop(counted);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
