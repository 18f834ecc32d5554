//! The live device registry.

use std::collections::BTreeMap;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::device::{Device, DeviceState};
use crate::notify::ChangeNotifier;
use crate::util::{lock, read, write};
use crate::{Advertisement, DeviceId};

/// A concurrent map from device identity to aggregated device state.
///
/// Two lock scopes guard the registry: the map lock and one lock per device. The map lock is always acquired first.
/// Updates to known devices hold the map lock shared, so updates to different devices never wait on each other, while
/// creating a device, [`clear`][Self::clear] and [`evict_stale`][Self::evict_stale] hold it exclusively.
///
/// The registry does no filtering or sorting; see [`DeviceFilter`][crate::DeviceFilter] and
/// [`SortKey`][crate::SortKey] for that.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<BTreeMap<DeviceId, Mutex<DeviceState>>>,
    notifier: Option<ChangeNotifier>,
}

impl DeviceRegistry {
    /// Creates an empty registry that emits no change notifications.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry that signals `notifier` whenever visible state changes.
    pub fn with_notifier(notifier: ChangeNotifier) -> Self {
        DeviceRegistry {
            devices: RwLock::default(),
            notifier: Some(notifier),
        }
    }

    /// Applies `adv` to the device identified by `id`, creating the device if it is new.
    ///
    /// Returns `true` if a device was created.
    pub fn upsert(&self, id: DeviceId, adv: Advertisement) -> bool {
        let created = self.apply(id, adv);
        self.notify();
        created
    }

    fn apply(&self, id: DeviceId, adv: Advertisement) -> bool {
        {
            let devices = read(&self.devices);
            if let Some(state) = devices.get(&id) {
                lock(state).update(adv);
                return false;
            }
        }

        let mut devices = write(&self.devices);
        // another upsert may have created the device between the two lock scopes
        let mut created = false;
        let state = devices.entry(id).or_insert_with_key(|id| {
            debug!(%id, "new device");
            created = true;
            Mutex::new(DeviceState::new(id.clone(), adv.timestamp))
        });
        lock(state).update(adv);
        created
    }

    /// Copies every device, ordered by identity.
    ///
    /// The copies share nothing with the registry; later updates never alter them.
    pub fn snapshot_all(&self) -> Vec<Device> {
        let devices = read(&self.devices);
        devices.values().map(|state| lock(state).snapshot()).collect()
    }

    /// Copies the device identified by `id`, if it is known.
    pub fn snapshot_one(&self, id: &DeviceId) -> Option<Device> {
        let devices = read(&self.devices);
        devices.get(id).map(|state| lock(state).snapshot())
    }

    /// Returns `true` if the device identified by `id` is known.
    pub fn contains(&self, id: &DeviceId) -> bool {
        read(&self.devices).contains_key(id)
    }

    /// The number of known devices.
    pub fn count(&self) -> usize {
        read(&self.devices).len()
    }

    /// Returns `true` if no devices are known.
    pub fn is_empty(&self) -> bool {
        read(&self.devices).is_empty()
    }

    /// Forgets every device.
    pub fn clear(&self) {
        let removed = {
            let mut devices = write(&self.devices);
            let removed = devices.len();
            devices.clear();
            removed
        };
        debug!(removed, "registry cleared");
        self.notify();
    }

    /// Removes every device last seen more than `ttl` before `now`.
    ///
    /// All stale devices are removed in one pass under the map lock, and at most one change notification is emitted
    /// for the whole pass. Returns `true` if anything was removed.
    pub fn evict_stale(&self, now: Instant, ttl: Duration) -> bool {
        let removed = {
            let mut devices = write(&self.devices);
            let before = devices.len();
            devices.retain(|id, state| {
                let stale = now.saturating_duration_since(lock(state).last_seen()) > ttl;
                if stale {
                    trace!(%id, "evicting stale device");
                }
                !stale
            });
            before - devices.len()
        };

        if removed > 0 {
            debug!(removed, "evicted stale devices");
            self.notify();
        }
        removed > 0
    }

    fn notify(&self) {
        if let Some(notifier) = &self.notifier {
            notifier.notify();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AdvertisementData, ManufacturerData};

    fn adv(timestamp: Instant, rssi: i16) -> Advertisement {
        Advertisement::new(timestamp, rssi, AdvertisementData::default())
    }

    #[test]
    fn count_tracks_distinct_identities() {
        let registry = DeviceRegistry::new();
        let now = Instant::now();
        assert!(registry.upsert("a".into(), adv(now, -50)));
        assert!(registry.upsert("b".into(), adv(now, -60)));
        assert!(!registry.upsert("a".into(), adv(now, -55)));
        assert_eq!(registry.count(), 2);
        assert!(registry.contains(&"b".into()));

        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(registry.snapshot_one(&"a".into()), None);
    }

    #[test]
    fn snapshots_are_ordered_by_identity() {
        let registry = DeviceRegistry::new();
        let now = Instant::now();
        for id in ["c", "a", "b"] {
            registry.upsert(id.into(), adv(now, -70));
        }
        let ids: Vec<String> = registry
            .snapshot_all()
            .into_iter()
            .map(|d| d.id.to_string())
            .collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn manufacturer_scenario() {
        let registry = DeviceRegistry::new();
        let id = DeviceId::new("AA:BB:CC:DD:EE:01");
        let now = Instant::now();
        for (offset, rssi) in [(0, -60), (100, -80)] {
            let data = AdvertisementData {
                manufacturer_data: ManufacturerData::from_bytes(&[0x4c, 0x00, 0x01, 0x02]),
                ..Default::default()
            };
            registry.upsert(
                id.clone(),
                Advertisement::new(now + Duration::from_millis(offset), rssi, data),
            );
        }

        let device = registry.snapshot_one(&id).unwrap();
        assert_eq!(device.manufacturer_data.as_ref().map(|m| m.company_id), Some(0x004c));
        assert_eq!(device.manufacturer_data.as_ref().map(|m| m.data.clone()), Some(vec![0x01, 0x02]));
        assert_eq!(device.rssi_average, -70.0);
        assert_eq!(device.adv_count, 2);
    }

    #[test]
    fn evicts_only_stale_devices() {
        let registry = DeviceRegistry::new();
        let now = Instant::now();
        let ttl = Duration::from_secs(30);
        registry.upsert("old".into(), adv(now, -70));
        registry.upsert("fresh".into(), adv(now + Duration::from_secs(20), -70));

        assert!(!registry.evict_stale(now + Duration::from_secs(30), ttl));
        assert!(registry.evict_stale(now + Duration::from_secs(31), ttl));

        let ids: Vec<DeviceId> = registry.snapshot_all().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![DeviceId::new("fresh")]);
        assert!(!registry.evict_stale(now + Duration::from_secs(31), ttl));
    }

    #[test]
    fn eviction_signals_once_per_sweep() {
        let (notifier, mut changes) = ChangeNotifier::new(16);
        let registry = DeviceRegistry::with_notifier(notifier);
        let now = Instant::now();
        for id in ["a", "b", "c", "d"] {
            registry.upsert(id.into(), adv(now, -70));
        }
        assert_eq!(changes.drain(), 4);

        assert!(registry.evict_stale(now + Duration::from_secs(60), Duration::from_secs(30)));
        assert_eq!(changes.drain(), 1);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn snapshot_is_isolated_from_later_updates() {
        let registry = DeviceRegistry::new();
        let id = DeviceId::new("dev");
        let now = Instant::now();
        registry.upsert(id.clone(), adv(now, -50));
        let before = registry.snapshot_one(&id).unwrap();

        let data = AdvertisementData {
            local_name: Some("Renamed".to_string()),
            ..Default::default()
        };
        registry.upsert(id.clone(), Advertisement::new(now + Duration::from_millis(50), -90, data));

        assert_eq!(before.name, None);
        assert_eq!(before.rssi_current, -50);
        assert_eq!(before.adv_count, 1);
        assert_eq!(before.rssi_history.len(), 1);
        assert_eq!(before.advertisements.len(), 1);
        assert_eq!(registry.snapshot_one(&id).unwrap().adv_count, 2);
    }
}
