//! Process-lifetime wiring: registry plus its two background tasks.

use std::sync::Arc;

use gomibako_core::{KeyGenerator, RandomKeyGenerator};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::broadcaster::Broadcaster;
use crate::clock::{Clock, SystemClock};
use crate::config::HubConfig;
use crate::reaper::spawn_reaper;
use crate::registry::Registry;

/// A running registry with its broadcaster and reaper.
///
/// Dropping a `Hub` without calling [`Hub::shutdown`] leaves both tasks
/// running until the runtime stops.
pub struct Hub {
    registry: Arc<Registry>,
    shutdown: CancellationToken,
    broadcaster: JoinHandle<()>,
    reaper: JoinHandle<()>,
}

impl Hub {
    /// Start a hub with random keys drawn from `config.key_policy`.
    ///
    /// Must be called from within a `tokio` runtime.
    #[must_use]
    pub fn start(config: HubConfig) -> Self {
        let keys = Arc::new(RandomKeyGenerator::new(config.key_policy.clone()));
        Self::start_with(config, keys, Arc::new(SystemClock))
    }

    /// Start a hub with an explicit key generator and clock.
    #[must_use]
    pub fn start_with(
        config: HubConfig,
        keys: Arc<dyn KeyGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (registry, queue) = Registry::with_clock(config, keys, clock);
        let registry = Arc::new(registry);
        let shutdown = CancellationToken::new();

        let broadcaster =
            Broadcaster::new(Arc::clone(&registry), queue).spawn(shutdown.child_token());
        let reaper = spawn_reaper(Arc::clone(&registry), shutdown.child_token());

        Self { registry, shutdown, broadcaster, reaper }
    }

    /// Shared handle to the registry.
    #[must_use]
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Stop both background tasks and wait for them to exit.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.broadcaster.await {
            tracing::error!(error = %e, "broadcaster task failed");
        }
        if let Err(e) = self.reaper.await {
            tracing::error!(error = %e, "reaper task failed");
        }
        tracing::info!("hub stopped");
    }
}
