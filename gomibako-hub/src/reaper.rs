//! Periodic expiry of old bins.
//!
//! # Graceful Shutdown
//!
//! The task watches a cancellation token. When cancelled it finishes the
//! sweep in progress, if any, and exits.

use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::registry::Registry;

/// Start the reaper loop on the current task.
///
/// Every `sweep_interval` it calls [`Registry::sweep`] with the registry's
/// clock. The first sweep runs immediately. A sweep that panics is logged
/// and the next tick still runs.
pub async fn run_reaper(registry: Arc<Registry>, shutdown: CancellationToken) {
    let period = registry.config().sweep_interval;
    tracing::info!(
        sweep_interval_secs = period.as_secs(),
        ttl_secs = registry.config().ttl.as_secs(),
        "reaper started"
    );

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => sweep_once(&registry).await,
            () = shutdown.cancelled() => break,
        }
    }

    tracing::info!("reaper stopped");
}

/// Spawn [`run_reaper`] as a background task.
pub fn spawn_reaper(
    registry: Arc<Registry>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run_reaper(registry, shutdown))
}

/// Run a single sweep in its own task so a panic cannot take the loop down.
async fn sweep_once(registry: &Arc<Registry>) {
    let registry = Arc::clone(registry);
    let sweep = tokio::spawn(async move {
        let now = registry.now();
        registry.sweep(now).await
    });
    match sweep.await {
        Ok(report) => {
            if !report.removed.is_empty() {
                tracing::debug!(removed = report.removed.len(), "reaper tick removed bins");
            }
        }
        Err(e) => tracing::error!(error = %e, "sweep failed, retrying next tick"),
    }
}
