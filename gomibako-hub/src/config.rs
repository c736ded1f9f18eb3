//! Hub configuration.

use std::str::FromStr;
use std::time::Duration;

use gomibako_core::KeyPolicy;

/// Default number of requests kept per bin.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// Default capacity of the shared ingestion queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default per-feed buffer. One slot is the closest to a rendezvous channel.
pub const DEFAULT_FEED_CAPACITY: usize = 1;

/// Default bin lifetime: one week.
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default period between expiry sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default number of attempts to mint a key that is not already taken.
pub const DEFAULT_KEY_ATTEMPTS: u32 = 5;

/// What the broadcaster does when a subscriber's buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Wait for the subscriber to make room.
    ///
    /// Delivery is lossless, but one stalled subscriber holds up fan-out to
    /// every bin until it drains, unsubscribes, or its bin expires.
    #[default]
    Block,
    /// Close the subscriber's feed instead of waiting.
    ///
    /// Fan-out never stalls; a slow subscriber loses its feed and has to
    /// subscribe again.
    Disconnect,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(Self::Block),
            "disconnect" => Ok(Self::Disconnect),
            other => Err(format!("unknown overflow policy '{other}'")),
        }
    }
}

/// Tunables for the registry and its background tasks.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct HubConfig {
    /// Requests retained per bin; the oldest is evicted first.
    pub history_capacity: usize,
    /// Capacity of the queue between ingestion and the broadcaster.
    pub queue_capacity: usize,
    /// Buffered requests per subscriber feed.
    pub feed_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    /// Age after which a bin is removed by the reaper.
    pub ttl: Duration,
    pub sweep_interval: Duration,
    /// Attempts at drawing an unused key before `create` gives up.
    pub key_attempts: u32,
    pub key_policy: KeyPolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            feed_capacity: DEFAULT_FEED_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
            ttl: DEFAULT_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            key_attempts: DEFAULT_KEY_ATTEMPTS,
            key_policy: KeyPolicy::default(),
        }
    }
}

impl HubConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `GOMIBAKO_HISTORY_CAPACITY` (default: 10)
    /// - `GOMIBAKO_QUEUE_CAPACITY` (default: 100)
    /// - `GOMIBAKO_FEED_CAPACITY` (default: 1)
    /// - `GOMIBAKO_OVERFLOW_POLICY` - `block` or `disconnect` (default: block)
    /// - `GOMIBAKO_TTL_SECS` (default: 604800)
    /// - `GOMIBAKO_SWEEP_INTERVAL_SECS` (default: 300)
    /// - `GOMIBAKO_KEY_ATTEMPTS` (default: 5)
    ///
    /// Values that fail to parse are logged and replaced by the default.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup (for testing).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            history_capacity: parse_or(
                &lookup,
                "GOMIBAKO_HISTORY_CAPACITY",
                defaults.history_capacity,
            ),
            queue_capacity: parse_or(&lookup, "GOMIBAKO_QUEUE_CAPACITY", defaults.queue_capacity),
            feed_capacity: parse_or(&lookup, "GOMIBAKO_FEED_CAPACITY", defaults.feed_capacity),
            overflow_policy: parse_or(
                &lookup,
                "GOMIBAKO_OVERFLOW_POLICY",
                defaults.overflow_policy,
            ),
            ttl: Duration::from_secs(parse_or(
                &lookup,
                "GOMIBAKO_TTL_SECS",
                defaults.ttl.as_secs(),
            )),
            sweep_interval: Duration::from_secs(parse_or(
                &lookup,
                "GOMIBAKO_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval.as_secs(),
            )),
            key_attempts: parse_or(&lookup, "GOMIBAKO_KEY_ATTEMPTS", defaults.key_attempts),
            key_policy: defaults.key_policy,
        }
        .normalized()
    }

    /// Set the per-bin history capacity.
    #[must_use]
    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self.normalized()
    }

    /// Set the shared ingestion queue capacity.
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self.normalized()
    }

    /// Set the per-feed buffer capacity.
    #[must_use]
    pub fn feed_capacity(mut self, capacity: usize) -> Self {
        self.feed_capacity = capacity;
        self.normalized()
    }

    #[must_use]
    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the reaper period. Zero is bumped to one millisecond.
    #[must_use]
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self.normalized()
    }

    #[must_use]
    pub fn key_attempts(mut self, attempts: u32) -> Self {
        self.key_attempts = attempts;
        self.normalized()
    }

    #[must_use]
    pub fn key_policy(mut self, policy: KeyPolicy) -> Self {
        self.key_policy = policy;
        self
    }

    /// `tokio` channels and intervals panic on zero sizes and periods.
    fn normalized(mut self) -> Self {
        self.history_capacity = self.history_capacity.max(1);
        self.queue_capacity = self.queue_capacity.max(1);
        self.feed_capacity = self.feed_capacity.max(1);
        self.key_attempts = self.key_attempts.max(1);
        if self.sweep_interval.is_zero() {
            self.sweep_interval = Duration::from_millis(1);
        }
        self
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    var = name,
                    value = %raw,
                    error = %e,
                    ?default,
                    "ignoring invalid setting"
                );
                default
            }
        },
    }
}
