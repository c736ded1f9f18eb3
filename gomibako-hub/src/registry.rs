//! The bin registry.
//!
//! Owns every live bin and is the only way in or out: creation, ingestion,
//! snapshots, subscriptions and expiry all go through [`Registry`].
//!
//! # Locking
//!
//! The map sits behind one `RwLock`; each bin has its own locks. The map lock
//! is always taken first. Nothing holds the map lock while waiting on the
//! ingestion queue or on a subscriber, so a stalled subscriber can delay
//! fan-out but never the reaper's write lock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gomibako_core::{BinKey, CapturedRequest, FeedId, KeyGenerator};
use tokio::sync::{mpsc, RwLock};

use crate::clock::{Clock, SystemClock};
use crate::config::HubConfig;
use crate::error::HubError;
use crate::feed::{self, Feed, FeedSink};
use crate::inbox::{Inbox, InboxStats};

/// A recorded request waiting for fan-out.
#[derive(Debug)]
pub(crate) struct Queued {
    /// Per-bin sequence number assigned when the request entered history.
    pub(crate) seq: u64,
    pub(crate) request: Arc<CapturedRequest>,
}

/// Receiving end of the shared ingestion queue, consumed by the
/// [`Broadcaster`](crate::Broadcaster).
#[derive(Debug)]
pub struct IngestQueue(pub(crate) mpsc::Receiver<Queued>);

/// Result of one expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct SweepReport {
    /// Bins removed by this sweep, sorted.
    pub removed: Vec<BinKey>,
    /// Bins still alive afterwards, sorted.
    pub surviving: Vec<BinKey>,
    /// Feeds closed because their bin expired.
    pub feeds_closed: usize,
}

/// Central registry of all live bins.
pub struct Registry {
    inboxes: RwLock<HashMap<BinKey, Arc<Inbox>>>,
    queue: mpsc::Sender<Queued>,
    keys: Arc<dyn KeyGenerator>,
    clock: Arc<dyn Clock>,
    config: HubConfig,
}

impl Registry {
    /// Create a registry on the system clock.
    ///
    /// The returned [`IngestQueue`] must be handed to a
    /// [`Broadcaster`](crate::Broadcaster); until it is drained, ingestion
    /// blocks once `queue_capacity` requests are pending.
    #[must_use]
    pub fn new(config: HubConfig, keys: Arc<dyn KeyGenerator>) -> (Self, IngestQueue) {
        Self::with_clock(config, keys, Arc::new(SystemClock))
    }

    /// Create a registry with an explicit clock for creation timestamps.
    #[must_use]
    pub fn with_clock(
        config: HubConfig,
        keys: Arc<dyn KeyGenerator>,
        clock: Arc<dyn Clock>,
    ) -> (Self, IngestQueue) {
        let (queue, rx) = mpsc::channel(config.queue_capacity.max(1));
        let registry = Self { inboxes: RwLock::new(HashMap::new()), queue, keys, clock, config };
        (registry, IngestQueue(rx))
    }

    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Current time according to the registry's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Register a new, empty bin under a fresh key.
    ///
    /// Keys that collide with a live bin are discarded and redrawn, up to
    /// `key_attempts` times.
    ///
    /// # Errors
    /// Returns [`HubError::KeyGeneration`] if the generator fails, or
    /// [`HubError::KeyExhausted`] if every attempt collided. Both are
    /// transient.
    pub async fn create(&self) -> Result<BinKey, HubError> {
        let attempts = self.config.key_attempts.max(1);
        for attempt in 1..=attempts {
            let key = self.keys.generate().map_err(HubError::KeyGeneration)?;

            let mut inboxes = self.inboxes.write().await;
            if inboxes.contains_key(&key) {
                tracing::warn!(bin = %key, attempt, "generated key already in use, retrying");
                continue;
            }
            let inbox = Inbox::new(key.clone(), self.clock.now(), self.config.history_capacity);
            inboxes.insert(key.clone(), Arc::new(inbox));

            tracing::info!(bin = %key, bins = inboxes.len(), "bin created");
            return Ok(key);
        }
        Err(HubError::KeyExhausted { attempts })
    }

    /// Record a request into its bin and queue it for fan-out.
    ///
    /// Waits while the ingestion queue is full.
    ///
    /// # Errors
    /// Returns [`HubError::NotFound`] if `request.key` names no live bin.
    /// Nothing is created in that case.
    pub async fn ingest(&self, request: CapturedRequest) -> Result<(), HubError> {
        let inbox = self.lookup(&request.key).await?;
        let request = Arc::new(request);

        let _order = inbox.lock_ingest_order().await;
        let Some(seq) = inbox.append(Arc::clone(&request)).await else {
            return Err(HubError::NotFound(request.key.clone()));
        };

        tracing::debug!(
            bin = %request.key,
            method = %request.method,
            body_len = request.body.len(),
            "request recorded"
        );

        if self.queue.send(Queued { seq, request }).await.is_err() {
            // History is already updated; only live fan-out is lost.
            tracing::debug!(bin = %inbox.key(), "broadcaster stopped, request not fanned out");
        }
        Ok(())
    }

    /// The bin's history, oldest first.
    ///
    /// # Errors
    /// Returns [`HubError::NotFound`] if the key names no live bin.
    pub async fn snapshot(&self, key: &BinKey) -> Result<Vec<Arc<CapturedRequest>>, HubError> {
        let inboxes = self.inboxes.read().await;
        let inbox = inboxes.get(key).ok_or_else(|| HubError::NotFound(key.clone()))?;
        Ok(inbox.snapshot().await)
    }

    /// Open a live feed on a bin.
    ///
    /// The feed receives only requests recorded after this returns, even if
    /// earlier ones are still waiting in the ingestion queue.
    ///
    /// # Errors
    /// Returns [`HubError::NotFound`] if the key names no live bin.
    pub async fn subscribe(&self, key: &BinKey) -> Result<Feed, HubError> {
        let inboxes = self.inboxes.read().await;
        let inbox = inboxes.get(key).ok_or_else(|| HubError::NotFound(key.clone()))?;

        let (sink, feed) = feed::channel(key.clone(), self.config.feed_capacity);
        if !inbox.add_feed(sink).await {
            return Err(HubError::NotFound(key.clone()));
        }

        tracing::info!(bin = %key, feed = %feed.id(), "subscriber added");
        Ok(feed)
    }

    /// Remove and close a feed.
    ///
    /// Idempotent: unsubscribing a feed that is already closed, including one
    /// closed because its bin just expired, succeeds without closing it again.
    ///
    /// # Errors
    /// Returns [`HubError::NotFound`] if the key names no live bin and `feed`
    /// is not an already-closed feed of that bin.
    pub async fn unsubscribe(&self, key: &BinKey, feed: &Feed) -> Result<(), HubError> {
        let inbox = {
            let inboxes = self.inboxes.read().await;
            inboxes.get(key).cloned()
        };
        let Some(inbox) = inbox else {
            if feed.key() == key && feed.is_closed() {
                return Ok(());
            }
            return Err(HubError::NotFound(key.clone()));
        };

        if inbox.remove_feed(feed.id()).await {
            tracing::info!(bin = %key, feed = %feed.id(), "subscriber removed");
        }
        Ok(())
    }

    /// Remove every bin older than the TTL at `now`, closing its feeds first.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let ttl = self.config.ttl;
        let mut inboxes = self.inboxes.write().await;
        tracing::debug!(bins = inboxes.len(), "sweep started");

        let mut report = SweepReport::default();
        let expired: Vec<BinKey> = inboxes
            .values()
            .filter(|inbox| inbox.is_older_than(ttl, now))
            .map(|inbox| inbox.key().clone())
            .collect();

        for key in expired {
            let Some(inbox) = inboxes.get(&key).cloned() else { continue };
            let closed = inbox.expire().await;
            inboxes.remove(&key);
            report.feeds_closed += closed;
            tracing::info!(bin = %key, feeds_closed = closed, "bin expired");
            report.removed.push(key);
        }

        report.removed.sort();
        report.surviving = inboxes.keys().cloned().collect();
        report.surviving.sort();

        let surviving =
            report.surviving.iter().map(BinKey::as_str).collect::<Vec<_>>().join(", ");
        tracing::info!(
            removed = report.removed.len(),
            remaining = report.surviving.len(),
            bins = %surviving,
            "sweep complete"
        );
        report
    }

    /// Whether a live bin exists under `key`.
    pub async fn contains(&self, key: &BinKey) -> bool {
        self.inboxes.read().await.contains_key(key)
    }

    /// Number of live bins.
    pub async fn inbox_count(&self) -> usize {
        self.inboxes.read().await.len()
    }

    /// Statistics for one bin.
    ///
    /// # Errors
    /// Returns [`HubError::NotFound`] if the key names no live bin.
    pub async fn stats(&self, key: &BinKey) -> Result<InboxStats, HubError> {
        let inboxes = self.inboxes.read().await;
        let inbox = inboxes.get(key).ok_or_else(|| HubError::NotFound(key.clone()))?;
        Ok(inbox.stats().await)
    }

    /// Copy of the bin's feed set; the map lock is released on return.
    pub(crate) async fn feeds_of(&self, key: &BinKey) -> Option<Vec<FeedSink>> {
        let inboxes = self.inboxes.read().await;
        let inbox = inboxes.get(key)?;
        Some(inbox.feeds().await)
    }

    /// Remove and close a feed the broadcaster gave up on.
    pub(crate) async fn drop_feed(&self, key: &BinKey, id: FeedId) -> bool {
        let inboxes = self.inboxes.read().await;
        match inboxes.get(key) {
            Some(inbox) => inbox.remove_feed(id).await,
            None => false,
        }
    }

    async fn lookup(&self, key: &BinKey) -> Result<Arc<Inbox>, HubError> {
        self.inboxes
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| HubError::NotFound(key.clone()))
    }
}
