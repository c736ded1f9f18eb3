//! Subscriber feeds.
//!
//! A feed is a bounded `mpsc` channel plus a cancellation token. The token is
//! the close signal: once cancelled, the receiving [`Feed`] reports EOF even
//! if requests are still buffered, and a send blocked on a full buffer is
//! abandoned. Cancelling twice is a no-op, but the registry still only closes
//! a feed from the path that removed it from its bin.

use std::sync::Arc;

use gomibako_core::{BinKey, CapturedRequest, FeedId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::OverflowPolicy;

/// Outcome of pushing one request into a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered,
    /// The feed was closed before or during the send.
    Closed,
    /// The subscriber dropped its [`Feed`] without unsubscribing.
    Gone,
    /// The buffer was full and the policy forbids waiting.
    Overflowed,
}

/// Sending half, held by the bin that owns the feed.
#[derive(Debug, Clone)]
pub(crate) struct FeedSink {
    id: FeedId,
    tx: mpsc::Sender<Arc<CapturedRequest>>,
    closed: CancellationToken,
    /// Sequence number of the first request this feed may see.
    from_seq: u64,
}

impl FeedSink {
    pub(crate) fn id(&self) -> FeedId {
        self.id
    }

    /// Start the feed at `seq`; earlier requests of the bin are never sent.
    pub(crate) fn start_at(&mut self, seq: u64) {
        self.from_seq = seq;
    }

    /// Whether the request stamped `seq` was ingested after this feed joined.
    pub(crate) fn wants(&self, seq: u64) -> bool {
        seq >= self.from_seq
    }

    pub(crate) fn close(&self) {
        self.closed.cancel();
    }

    pub(crate) async fn deliver(
        &self,
        request: Arc<CapturedRequest>,
        policy: OverflowPolicy,
    ) -> Delivery {
        if self.closed.is_cancelled() {
            return Delivery::Closed;
        }
        match policy {
            OverflowPolicy::Block => {
                tokio::select! {
                    biased;
                    () = self.closed.cancelled() => Delivery::Closed,
                    sent = self.tx.send(request) => match sent {
                        Ok(()) => Delivery::Delivered,
                        Err(_) => Delivery::Gone,
                    },
                }
            }
            OverflowPolicy::Disconnect => match self.tx.try_send(request) {
                Ok(()) => Delivery::Delivered,
                Err(mpsc::error::TrySendError::Full(_)) => Delivery::Overflowed,
                Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Gone,
            },
        }
    }
}

/// Receiving half handed to a subscriber by
/// [`Registry::subscribe`](crate::Registry::subscribe).
///
/// Sees only requests ingested after the subscription was made. Reading
/// returns `None` once the feed is closed by `unsubscribe`, by the bin's
/// expiry, or by an overflow disconnect.
#[derive(Debug)]
pub struct Feed {
    id: FeedId,
    key: BinKey,
    rx: mpsc::Receiver<Arc<CapturedRequest>>,
    closed: CancellationToken,
}

impl Feed {
    #[must_use]
    pub fn id(&self) -> FeedId {
        self.id
    }

    /// Bin this feed is attached to.
    #[must_use]
    pub fn key(&self) -> &BinKey {
        &self.key
    }

    /// Whether the feed has been closed. A closed feed never yields again.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Waits for the next request, or `None` once the feed is closed.
    ///
    /// # Cancel Safety
    /// Cancel safe: dropping the future loses no request.
    pub async fn recv(&mut self) -> Option<Arc<CapturedRequest>> {
        tokio::select! {
            biased;
            () = self.closed.cancelled() => None,
            item = self.rx.recv() => item,
        }
    }
}

/// Creates a connected sink/feed pair for `key`.
pub(crate) fn channel(key: BinKey, capacity: usize) -> (FeedSink, Feed) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let closed = CancellationToken::new();
    let id = FeedId::new();
    (FeedSink { id, tx, closed: closed.clone(), from_seq: 0 }, Feed { id, key, rx, closed })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn request(body: &'static str) -> Arc<CapturedRequest> {
        Arc::new(CapturedRequest::new(BinKey::new("feedtest"), "POST", "/").with_body(body))
    }

    #[tokio::test]
    async fn delivered_request_is_received() {
        let (sink, mut feed) = channel(BinKey::new("feedtest"), 1);
        assert_eq!(sink.id(), feed.id());
        assert_eq!(sink.deliver(request("a"), OverflowPolicy::Block).await, Delivery::Delivered);
        let got = feed.recv().await.map(|r| r.body.clone());
        assert_eq!(got.as_deref(), Some(&b"a"[..]));
    }

    #[tokio::test]
    async fn close_hides_buffered_requests() {
        let (sink, mut feed) = channel(BinKey::new("feedtest"), 4);
        assert_eq!(sink.deliver(request("a"), OverflowPolicy::Block).await, Delivery::Delivered);
        sink.close();
        assert!(feed.is_closed());
        assert!(feed.recv().await.is_none(), "closed feed must read as EOF");
        assert!(feed.recv().await.is_none(), "EOF is sticky");
        assert_eq!(sink.deliver(request("b"), OverflowPolicy::Block).await, Delivery::Closed);
    }

    #[tokio::test]
    async fn close_releases_blocked_send() {
        let (sink, _feed) = channel(BinKey::new("feedtest"), 1);
        assert_eq!(sink.deliver(request("a"), OverflowPolicy::Block).await, Delivery::Delivered);

        let blocked = {
            let sink = sink.clone();
            tokio::spawn(async move { sink.deliver(request("b"), OverflowPolicy::Block).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished(), "send must wait while the buffer is full");

        sink.close();
        let outcome = match tokio::time::timeout(Duration::from_secs(1), blocked).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => panic!("send task failed: {e}"),
            Err(_) => panic!("blocked send was not released by close"),
        };
        assert_eq!(outcome, Delivery::Closed);
    }

    #[tokio::test]
    async fn disconnect_policy_reports_overflow() {
        let (sink, _feed) = channel(BinKey::new("feedtest"), 1);
        let policy = OverflowPolicy::Disconnect;
        assert_eq!(sink.deliver(request("a"), policy).await, Delivery::Delivered);
        assert_eq!(sink.deliver(request("b"), policy).await, Delivery::Overflowed);
    }

    #[test]
    fn start_sequence_filters_earlier_requests() {
        let (mut sink, _feed) = channel(BinKey::new("feedtest"), 1);
        assert!(sink.wants(0), "fresh sink accepts everything");
        sink.start_at(3);
        assert!(!sink.wants(2));
        assert!(sink.wants(3));
        assert!(sink.wants(4));
    }

    #[tokio::test]
    async fn dropped_feed_is_reported_gone() {
        let (sink, feed) = channel(BinKey::new("feedtest"), 1);
        drop(feed);
        assert_eq!(sink.deliver(request("a"), OverflowPolicy::Block).await, Delivery::Gone);
        assert_eq!(sink.deliver(request("a"), OverflowPolicy::Disconnect).await, Delivery::Gone);
    }
}
