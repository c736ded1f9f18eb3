//! Server-Sent Events live tail of a bin.

use std::sync::Arc;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use gomibako_core::CapturedRequest;
use gomibako_hub::{Feed, Registry};
use tokio_util::sync::CancellationToken;

use crate::view::RequestView;

/// A subscription owned by one SSE response.
///
/// Dropping it (client went away, or the stream ended) unsubscribes the feed
/// in the background.
pub struct LiveTail {
    registry: Arc<Registry>,
    feed: Option<Feed>,
    shutdown: CancellationToken,
}

impl LiveTail {
    #[must_use]
    pub fn new(registry: Arc<Registry>, feed: Feed, shutdown: CancellationToken) -> Self {
        Self { registry, feed: Some(feed), shutdown }
    }

    /// Next delivered request; `None` once the feed closes or the server
    /// shuts down.
    pub async fn next(&mut self) -> Option<Arc<CapturedRequest>> {
        let feed = self.feed.as_mut()?;
        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => None,
            item = feed.recv() => item,
        }
    }

    /// Turn the tail into an SSE response emitting one `request` event per
    /// delivered request.
    pub fn into_sse(self) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
        let events = futures::stream::unfold(self, |mut tail| async move {
            let request = tail.next().await?;
            let event = Event::default()
                .event("request")
                .json_data(RequestView::from(request.as_ref()));
            Some((event, tail))
        });
        Sse::new(events).keep_alive(KeepAlive::default())
    }
}

impl Drop for LiveTail {
    fn drop(&mut self) {
        let Some(feed) = self.feed.take() else { return };
        if feed.is_closed() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else { return };
        let registry = Arc::clone(&self.registry);
        runtime.spawn(async move {
            let key = feed.key().clone();
            if let Err(e) = registry.unsubscribe(&key, &feed).await {
                tracing::debug!(bin = %key, error = %e, "live tail cleanup skipped");
            }
        });
    }
}
