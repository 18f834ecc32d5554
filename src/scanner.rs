//! The scanning pipeline: source → registry → change notifications.

use std::sync::Arc;

use futures_lite::StreamExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::ErrorKind;
use crate::notify::{ChangeNotifier, ChangeReceiver};
use crate::registry::DeviceRegistry;
use crate::source::{AdvertisementSource, AdvertisementStream};
use crate::sweeper::EvictionSweeper;
use crate::{Advertisement, AdvertisingDevice, Result, ScannerConfig};

/// Feeds advertisements from an [`AdvertisementSource`] into a [`DeviceRegistry`] and keeps it free of stale devices.
///
/// The registry outlives scanning: after [`stop`][Self::stop] every device is still there and can be snapshotted, and
/// the scanner can be started again. Use [`clear`][Self::clear] to forget devices.
#[derive(Debug)]
pub struct Scanner<S: AdvertisementSource> {
    source: Arc<S>,
    config: ScannerConfig,
    registry: Arc<DeviceRegistry>,
    changes: Option<ChangeReceiver>,
    running: Option<Running>,
}

#[derive(Debug)]
struct Running {
    stop: oneshot::Sender<()>,
    ingest: JoinHandle<()>,
    sweeper: EvictionSweeper,
}

impl<S: AdvertisementSource> Scanner<S> {
    /// Creates a stopped scanner reading from `source`.
    pub fn new(source: S, config: ScannerConfig) -> Self {
        let (notifier, changes) = ChangeNotifier::new(config.notify_capacity);
        Scanner {
            source: Arc::new(source),
            registry: Arc::new(DeviceRegistry::with_notifier(notifier)),
            changes: Some(changes),
            config,
            running: None,
        }
    }

    /// The registry the scanner feeds.
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// The scanner's configuration.
    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Takes the receiver for change notifications. Returns `None` if it was already taken.
    pub fn subscribe(&mut self) -> Option<ChangeReceiver> {
        self.changes.take()
    }

    /// Returns `true` while the scanner is running.
    ///
    /// A scanner whose source stream has ended is no longer running, even before [`stop`][Self::stop] is called.
    pub fn is_running(&self) -> bool {
        self.running.as_ref().is_some_and(|running| !running.ingest.is_finished())
    }

    /// Starts the source, the ingest task and the eviction sweeper.
    ///
    /// Fails if the scanner is already running or the source can't start scanning; in the latter case nothing is
    /// spawned. If the previous source stream has ended, its tasks are cleaned up first and scanning starts afresh.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(ErrorKind::AlreadyScanning.into());
        }
        if self.running.is_some() {
            debug!("reaping scanner whose advertisement source ended");
            self.stop().await;
        }

        let stream = self.source.scan().await.map_err(|err| {
            warn!("failed to start advertisement source: {}", err);
            err
        })?;

        let (stop, stop_rx) = oneshot::channel();
        let ingest = tokio::spawn(ingest(stream, self.registry.clone(), stop_rx));
        let sweeper = EvictionSweeper::start(
            self.registry.clone(),
            self.config.device_ttl,
            self.config.sweep_interval,
        );
        self.running = Some(Running { stop, ingest, sweeper });

        info!("scanning started");
        Ok(())
    }

    /// Stops ingesting advertisements and sweeping, and waits for both tasks to finish.
    ///
    /// Devices already in the registry are kept. Calling `stop` on a stopped scanner does nothing.
    pub async fn stop(&mut self) {
        let Some(Running {
            stop,
            ingest,
            mut sweeper,
        }) = self.running.take()
        else {
            return;
        };

        let _ = stop.send(());
        if let Err(err) = ingest.await {
            warn!("ingest task failed: {}", err);
        }
        sweeper.stop().await;

        info!(devices = self.registry.count(), "scanning stopped");
    }

    /// Forgets every device. Scanning, if running, continues.
    pub fn clear(&self) {
        self.registry.clear();
    }
}

impl<S: AdvertisementSource> Drop for Scanner<S> {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.ingest.abort();
        }
    }
}

async fn ingest(mut stream: AdvertisementStream, registry: Arc<DeviceRegistry>, mut stop: oneshot::Receiver<()>) {
    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            next = stream.next() => match next {
                Some(device) => apply(&registry, device),
                None => {
                    debug!("advertisement source ended");
                    break;
                }
            }
        }
    }
}

fn apply(registry: &DeviceRegistry, device: AdvertisingDevice) {
    let AdvertisingDevice {
        id,
        mut adv_data,
        rssi,
        raw,
        received_at,
    } = device;

    let Some(rssi) = rssi else {
        trace!(%id, "dropping advertisement without RSSI");
        return;
    };

    if adv_data.ad_types.is_empty() {
        adv_data.ad_types = adv_data.infer_ad_types();
    }

    let adv = Advertisement {
        timestamp: received_at,
        rssi,
        data: adv_data,
        raw,
    };
    registry.upsert(id, adv);
}
