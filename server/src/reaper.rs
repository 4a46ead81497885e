//! Background idle sweep.
//!
//! Every `interval` the reaper tears down sessions untouched for at least
//! `threshold`. The first sweep runs one full interval after startup.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::sessions::SessionRegistry;

/// Spawn the perpetual sweep task. Abort the handle to stop it.
pub fn spawn(registry: SessionRegistry, interval: Duration, threshold: Duration) -> JoinHandle<()> {
    info!(
        "Idle reaper: sweeping every {}s, threshold {}s",
        interval.as_secs(),
        threshold.as_secs()
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let evicted = registry.sweep_idle(threshold).await;
            if !evicted.is_empty() {
                info!(
                    "Idle reaper evicted {} session(s), remaining: {}",
                    evicted.len(),
                    registry.len().await
                );
            }
        }
    })
}
