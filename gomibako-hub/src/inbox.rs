//! Per-bin state: bounded history and live feeds.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gomibako_core::{BinKey, CapturedRequest, FeedId};
use tokio::sync::{Mutex, MutexGuard};

use crate::feed::FeedSink;

/// Point-in-time view of one bin.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct InboxStats {
    pub key: BinKey,
    pub created_at: DateTime<Utc>,
    /// Requests currently retained.
    pub history_len: usize,
    /// Live feeds.
    pub subscriber_count: usize,
}

struct InboxState {
    history: VecDeque<Arc<CapturedRequest>>,
    feeds: HashMap<FeedId, FeedSink>,
    /// Sequence number the next appended request receives.
    next_seq: u64,
    /// Set once by the reaper; a stale handle must not resurrect the bin.
    expired: bool,
}

/// One bin.
///
/// `state` guards history and feeds and is never held across an await on
/// anything but itself. `ingest_order` spans append plus enqueue so that the
/// history and the broadcast queue see a bin's requests in the same order.
pub(crate) struct Inbox {
    key: BinKey,
    created_at: DateTime<Utc>,
    capacity: usize,
    ingest_order: Mutex<()>,
    state: Mutex<InboxState>,
}

impl Inbox {
    pub(crate) fn new(key: BinKey, created_at: DateTime<Utc>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            key,
            created_at,
            capacity,
            ingest_order: Mutex::new(()),
            state: Mutex::new(InboxState {
                history: VecDeque::with_capacity(capacity),
                feeds: HashMap::new(),
                next_seq: 0,
                expired: false,
            }),
        }
    }

    pub(crate) fn key(&self) -> &BinKey {
        &self.key
    }

    /// Strictly older than `ttl` at `now`. A creation time in the future
    /// (clock skew) never counts as expired.
    pub(crate) fn is_older_than(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.created_at)
            .to_std()
            .is_ok_and(|age| age > ttl)
    }

    pub(crate) async fn lock_ingest_order(&self) -> MutexGuard<'_, ()> {
        self.ingest_order.lock().await
    }

    /// Appends to the history, evicting the oldest entry when full.
    ///
    /// Returns the request's per-bin sequence number, or `None` if the bin
    /// has already expired.
    pub(crate) async fn append(&self, request: Arc<CapturedRequest>) -> Option<u64> {
        let mut state = self.state.lock().await;
        if state.expired {
            return None;
        }
        while state.history.len() >= self.capacity {
            state.history.pop_front();
        }
        state.history.push_back(request);
        let seq = state.next_seq;
        state.next_seq += 1;
        Some(seq)
    }

    /// Copy of the history, oldest first.
    pub(crate) async fn snapshot(&self) -> Vec<Arc<CapturedRequest>> {
        self.state.lock().await.history.iter().cloned().collect()
    }

    /// Registers a feed that sees only requests appended from now on.
    /// Returns `false` (and closes the sink) if the bin has already expired.
    pub(crate) async fn add_feed(&self, mut sink: FeedSink) -> bool {
        let mut state = self.state.lock().await;
        if state.expired {
            sink.close();
            return false;
        }
        sink.start_at(state.next_seq);
        state.feeds.insert(sink.id(), sink);
        true
    }

    /// Removes one feed under the bin lock, then closes it.
    /// Returns `false` if the feed was not registered, in which case whoever
    /// removed it already closed it.
    pub(crate) async fn remove_feed(&self, id: FeedId) -> bool {
        let removed = self.state.lock().await.feeds.remove(&id);
        match removed {
            Some(sink) => {
                sink.close();
                true
            }
            None => false,
        }
    }

    /// Copy of the live feed set for fan-out.
    pub(crate) async fn feeds(&self) -> Vec<FeedSink> {
        self.state.lock().await.feeds.values().cloned().collect()
    }

    /// Marks the bin expired and closes every remaining feed.
    /// Returns the number of feeds closed.
    pub(crate) async fn expire(&self) -> usize {
        let mut state = self.state.lock().await;
        state.expired = true;
        let feeds: Vec<FeedSink> = state.feeds.drain().map(|(_, sink)| sink).collect();
        for sink in &feeds {
            sink.close();
        }
        feeds.len()
    }

    pub(crate) async fn stats(&self) -> InboxStats {
        let state = self.state.lock().await;
        InboxStats {
            key: self.key.clone(),
            created_at: self.created_at,
            history_len: state.history.len(),
            subscriber_count: state.feeds.len(),
        }
    }
}
