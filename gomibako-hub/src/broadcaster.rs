//! Fan-out of ingested requests to live feeds.
//!
//! A single task drains the shared ingestion queue in FIFO order. For each
//! request it copies the bin's feed set (map lock released right after) and
//! delivers to every feed in turn, so delivery order across all bins follows
//! ingestion order. Feeds that joined after the request was recorded are
//! skipped, even though they are in the set by the time it is dequeued.
//!
//! Under [`OverflowPolicy::Block`] one subscriber that stops reading stalls
//! fan-out for every bin until it reads, unsubscribes, or its bin expires.
//! Closing a feed aborts a send pending on it. [`OverflowPolicy::Disconnect`]
//! trades that stall for dropping slow subscribers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::OverflowPolicy;
use crate::feed::Delivery;
use crate::registry::{IngestQueue, Queued, Registry};

/// The fan-out worker. Start one per registry.
pub struct Broadcaster {
    registry: Arc<Registry>,
    queue: IngestQueue,
    policy: OverflowPolicy,
}

impl Broadcaster {
    #[must_use]
    pub fn new(registry: Arc<Registry>, queue: IngestQueue) -> Self {
        let policy = registry.config().overflow_policy;
        Self { registry, queue, policy }
    }

    /// Spawn the dispatch loop. It runs until `shutdown` is cancelled or
    /// every queue sender is gone.
    pub fn spawn(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Run the dispatch loop on the current task.
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!(policy = ?self.policy, "broadcaster started");
        loop {
            let queued = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                next = self.queue.0.recv() => match next {
                    Some(queued) => queued,
                    None => break,
                },
            };
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                () = self.dispatch(queued) => {}
            }
        }
        tracing::info!("broadcaster stopped");
    }

    async fn dispatch(&self, queued: Queued) {
        let Queued { seq, request } = queued;
        let key = &request.key;
        let Some(feeds) = self.registry.feeds_of(key).await else {
            tracing::debug!(bin = %key, "bin gone before fan-out, dropping request");
            return;
        };

        let mut delivered = 0usize;
        for sink in feeds.iter().filter(|sink| sink.wants(seq)) {
            match sink.deliver(Arc::clone(&request), self.policy).await {
                Delivery::Delivered => delivered += 1,
                Delivery::Closed => {}
                Delivery::Gone => {
                    if self.registry.drop_feed(key, sink.id()).await {
                        tracing::debug!(bin = %key, feed = %sink.id(), "pruned abandoned feed");
                    }
                }
                Delivery::Overflowed => {
                    if self.registry.drop_feed(key, sink.id()).await {
                        tracing::warn!(
                            bin = %key,
                            feed = %sink.id(),
                            "slow subscriber disconnected"
                        );
                    }
                }
            }
        }
        tracing::trace!(bin = %key, feeds = feeds.len(), delivered, "request fanned out");
    }
}
