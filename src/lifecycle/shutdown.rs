//! Process-wide shutdown.
//!
//! The server subscribes once; the signal handler triggers. Requests that
//! are already streaming keep their own cancellation and drain normally.

use tokio_util::sync::CancellationToken;

/// Shared shutdown trigger for the gateway process.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that fires when shutdown is triggered. Cancelling the
    /// returned token does not shut anything else down.
    pub fn subscribe(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Stop accepting connections. Triggering twice is harmless.
    pub fn trigger(&self) {
        if !self.token.is_cancelled() {
            tracing::info!("Gateway shutdown triggered");
        }
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_reaches_every_subscriber() {
        let shutdown = Shutdown::new();
        let a = shutdown.subscribe();
        let b = shutdown.clone().subscribe();
        assert!(!shutdown.is_triggered());

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), async {
            a.cancelled().await;
            b.cancelled().await;
        })
        .await
        .expect("subscribers should observe shutdown");
        assert!(shutdown.is_triggered());
    }

    #[test]
    fn subscriber_cannot_trigger_shutdown() {
        let shutdown = Shutdown::new();
        shutdown.subscribe().cancel();
        assert!(!shutdown.is_triggered());
        assert!(!shutdown.subscribe().is_cancelled());
    }
}
