//! Scanner configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::time::Duration;

use tracing::warn;

/// Runtime settings for a [`Scanner`][crate::Scanner].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerConfig {
    /// How long a device may go unseen before it is evicted (default: 30s)
    pub device_ttl: Duration,
    /// How often stale devices are swept (default: 5s)
    pub sweep_interval: Duration,
    /// How many change notifications may be pending before further ones are coalesced (default: 100)
    pub notify_capacity: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            device_ttl: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(5),
            notify_capacity: 100,
        }
    }
}

impl ScannerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `BLESCAN_DEVICE_TTL_SECS`: staleness window in seconds (default: 30)
    /// - `BLESCAN_SWEEP_INTERVAL_SECS`: eviction cadence in seconds (default: 5)
    /// - `BLESCAN_NOTIFY_CAPACITY`: pending change notifications (default: 100)
    ///
    /// Unparseable or zero values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(secs) = parse_positive(&lookup, "BLESCAN_DEVICE_TTL_SECS") {
            cfg.device_ttl = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_positive(&lookup, "BLESCAN_SWEEP_INTERVAL_SECS") {
            cfg.sweep_interval = Duration::from_secs(secs);
        }

        if let Some(capacity) = parse_positive(&lookup, "BLESCAN_NOTIFY_CAPACITY") {
            cfg.notify_capacity = capacity as usize;
        }

        cfg
    }
}

fn parse_positive(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let value = lookup(key)?;
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            warn!(key, value = %value, "ignoring invalid configuration value");
            None
        }
    }
}
