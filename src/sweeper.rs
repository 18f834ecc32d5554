//! Periodic eviction of devices that stopped advertising.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use crate::registry::DeviceRegistry;

/// Sweep intervals are clamped to this range
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// A background task that evicts stale devices from a [`DeviceRegistry`] on a fixed cadence.
///
/// The sweeper only ever removes devices that went stale; stopping it leaves the registry untouched. Dropping a running
/// sweeper aborts its task.
#[derive(Debug)]
pub struct EvictionSweeper {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl EvictionSweeper {
    /// Spawns the sweep task on the current Tokio runtime.
    ///
    /// The first sweep runs one `interval` after the call. Intervals longer than a day are shortened to a day.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn start(registry: Arc<DeviceRegistry>, ttl: Duration, interval: Duration) -> Self {
        let interval = interval.clamp(MIN_SWEEP_INTERVAL, MAX_SWEEP_INTERVAL);
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(?ttl, ?interval, "eviction sweeper started");

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        trace!("sweeping stale devices");
                        registry.evict_stale(Instant::now(), ttl);
                    }
                }
            }

            debug!("eviction sweeper stopped");
        });

        EvictionSweeper {
            stop: Some(stop_tx),
            task: Some(task),
        }
    }

    /// Returns `true` until [`stop`][Self::stop] has been called or the task has died.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stops the sweep task and waits for it to finish.
    pub async fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!("eviction sweeper failed: {}", err);
            }
        }
    }
}

impl Drop for EvictionSweeper {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
