//! Consumer-side filtering, sorting and statistics over device snapshots.

use std::cmp::Ordering;
use std::time::{Duration, Instant};

use crate::device::Device;

/// The window over which [`DeviceStats::adv_per_second`] is measured
const RATE_WINDOW: Duration = Duration::from_secs(10);

/// Criteria a device must meet to be shown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    /// Case-insensitive substring of the display name
    pub name_contains: Option<String>,
    /// Minimum current RSSI in dBm
    pub min_rssi: Option<i16>,
}

impl DeviceFilter {
    /// Returns `true` if `device` meets every criterion.
    pub fn matches(&self, device: &Device) -> bool {
        if let Some(needle) = self.name_contains.as_deref().filter(|n| !n.is_empty()) {
            if !device
                .display_name()
                .to_lowercase()
                .contains(&needle.to_lowercase())
            {
                return false;
            }
        }
        self.min_rssi.map_or(true, |min| device.rssi_current >= min)
    }

    /// Keeps the devices that match.
    pub fn apply(&self, devices: Vec<Device>) -> Vec<Device> {
        devices.into_iter().filter(|d| self.matches(d)).collect()
    }
}

/// A field to order devices by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SortKey {
    /// Display name, A to Z, ignoring case
    Name,
    /// Current RSSI, strongest first
    #[default]
    Rssi,
    /// Advertisement count, highest first
    AdvCount,
    /// Last seen, most recent first
    LastSeen,
}

impl SortKey {
    /// Sorts `devices` by this key; ties are broken by identity so the order is stable between refreshes.
    pub fn sort(self, devices: &mut [Device]) {
        devices.sort_by(|a, b| self.compare(a, b).then_with(|| a.id.cmp(&b.id)));
    }

    fn compare(self, a: &Device, b: &Device) -> Ordering {
        match self {
            SortKey::Name => a.display_name().to_lowercase().cmp(&b.display_name().to_lowercase()),
            SortKey::Rssi => b.rssi_current.cmp(&a.rssi_current),
            SortKey::AdvCount => b.adv_count.cmp(&a.adv_count),
            SortKey::LastSeen => b.last_seen.cmp(&a.last_seen),
        }
    }

    /// The next key in display order, wrapping around.
    pub fn next(self) -> Self {
        match self {
            SortKey::Name => SortKey::Rssi,
            SortKey::Rssi => SortKey::AdvCount,
            SortKey::AdvCount => SortKey::LastSeen,
            SortKey::LastSeen => SortKey::Name,
        }
    }
}

/// A coarse signal quality bucket.
#[derive(Debug, displaydoc::Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SignalStrength {
    /// Excellent
    Excellent,
    /// Good
    Good,
    /// Fair
    Fair,
    /// Weak
    Weak,
}

impl SignalStrength {
    /// Buckets an RSSI value: -50 dBm and above is excellent, down to -70 good, down to -85 fair.
    pub fn from_rssi(rssi: i16) -> Self {
        match rssi {
            r if r >= -50 => SignalStrength::Excellent,
            r if r >= -70 => SignalStrength::Good,
            r if r >= -85 => SignalStrength::Fair,
            _ => SignalStrength::Weak,
        }
    }
}

/// Statistics derived from a device snapshot at a point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceStats {
    /// Advertisements per second over the last ten seconds
    pub adv_per_second: f64,
    /// Time since the device was last seen
    pub since_last_seen: Duration,
    /// Signal quality of the current RSSI
    pub signal: SignalStrength,
}

impl DeviceStats {
    /// Computes the statistics of `device` as of `now`.
    pub fn for_device(device: &Device, now: Instant) -> Self {
        let adv_per_second = if device.advertisements.len() > 1 {
            let recent = device
                .advertisements
                .iter()
                .filter(|adv| now.saturating_duration_since(adv.timestamp) < RATE_WINDOW)
                .count();
            recent as f64 / RATE_WINDOW.as_secs_f64()
        } else {
            0.0
        };

        DeviceStats {
            adv_per_second,
            since_last_seen: now.saturating_duration_since(device.last_seen),
            signal: SignalStrength::from_rssi(device.rssi_current),
        }
    }
}
