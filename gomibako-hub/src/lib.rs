//! In-memory bin registry with live fan-out and TTL expiry.
//!
//! ```text
//!   ingest ──► Registry ──► bounded history (per bin)
//!                 │
//!                 └──► ingestion queue ──► Broadcaster ──► feeds of that bin
//!
//!   Reaper ──(every sweep_interval)──► Registry::sweep ──► close feeds, drop bin
//! ```
//!
//! [`Hub`] starts the broadcaster and reaper tasks and stops them on
//! shutdown.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod broadcaster;
pub mod clock;
pub mod config;
pub mod error;
pub mod feed;
pub mod hub;
mod inbox;
pub mod reaper;
pub mod registry;

pub use broadcaster::Broadcaster;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{HubConfig, OverflowPolicy};
pub use error::HubError;
pub use feed::Feed;
pub use hub::Hub;
pub use inbox::InboxStats;
pub use reaper::{run_reaper, spawn_reaper};
pub use registry::{IngestQueue, Registry, SweepReport};
