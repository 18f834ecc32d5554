#![warn(missing_docs)]

//! Blescan is the core of a live [Bluetooth Low Energy] (BLE) advertisement scanner for [Rust]. It ingests a stream
//! of advertisements and keeps an aggregated, continuously updated summary per device: display name, signal strength
//! statistics, inferred advertising interval, and the merged set of advertisement fields the device has sent.
//!
//! The radio itself is not part of this crate. Advertisements enter through an [`AdvertisementSource`]; the crate
//! ships a channel-fed source for embedding and testing, and a BlueZ source on Linux behind the `bluez` feature.
//!
//! [Rust]: https://www.rust-lang.org/
//! [Bluetooth Low Energy]: https://www.bluetooth.com/specifications/specs/
//!
//! # Usage
//!
//! ```rust,no_run
//!# use blescan::{ChannelSource, Scanner, ScannerConfig, SortKey};
//!# use futures_lite::StreamExt;
//!# #[tokio::main]
//!# async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!let (_tx, source) = ChannelSource::new(256);
//!let mut scanner = Scanner::new(source, ScannerConfig::from_env());
//!let mut changes = scanner.subscribe().ok_or("change receiver already taken")?;
//!scanner.start().await?;
//!
//!while changes.next().await.is_some() {
//!    let mut devices = scanner.registry().snapshot_all();
//!    SortKey::Rssi.sort(&mut devices);
//!    for device in devices {
//!        println!("{} {} dBm ({:?})", device.display_name(), device.rssi_current, device.adv_interval);
//!    }
//!}
//!#
//!#    Ok(())
//!# }
//! ```
//!
//! # Overview
//!
//! - [`AdvertisementData::from_raw`] decodes raw `[length][type][payload]` advertisement records. Decoding never
//!   fails; malformed input yields whatever was parsed before the first broken record.
//! - [`DeviceState`] applies advertisements to one device: RSSI ring buffer and average, sticky optional fields,
//!   merged field type codes and the median advertising interval.
//! - [`DeviceRegistry`] maps device identities to their state. Snapshots are deep copies ([`Device`]) that never
//!   change once taken.
//! - [`ChangeNotifier`] is a bounded, coalescing "something changed" signal that never blocks the producer.
//! - [`Scanner`] wires a source, the registry, the notifier and the [`EvictionSweeper`] together and owns the
//!   `start`/`stop` lifecycle.
//!
//! Filtering and sorting are left to consumers; [`DeviceFilter`] and [`SortKey`] cover the common cases.
//!
//! # Concurrency
//!
//! The registry uses two lock scopes: one over the identity map and one per device. The map lock is always taken
//! first. Updates for different devices proceed in parallel; creating a device, clearing the registry and evicting
//! stale devices take the map lock exclusively.
//!
//! # Feature flags
//!
//! - `bluez` enables [`BluezSource`] on Linux.
//! - `serde` enables serializing/deserializing device identifiers and advertisement data.

pub mod ad;
pub mod btuuid;
pub mod config;
pub mod device;
pub mod error;
pub mod filter;
pub mod manufacturer;
pub mod notify;
pub mod registry;
pub mod scanner;
pub mod source;
pub mod sweeper;
mod util;

#[cfg(all(target_os = "linux", feature = "bluez"))]
mod bluer;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::time::Instant;

pub use btuuid::BluetoothUuidExt;
pub use config::ScannerConfig;
pub use device::{Device, DeviceState};
pub use error::Error;
pub use filter::{DeviceFilter, DeviceStats, SignalStrength, SortKey};
pub use manufacturer::{manufacturer_name, manufacturer_name_with_id};
pub use notify::{ChangeNotifier, ChangeReceiver};
pub use registry::DeviceRegistry;
pub use scanner::Scanner;
pub use source::{AdvertisementSource, AdvertisementStream, ChannelSource};
pub use sweeper::EvictionSweeper;
pub use uuid::Uuid;

#[cfg(all(target_os = "linux", feature = "bluez"))]
pub use crate::bluer::BluezSource;

/// Convenience alias for a result with [`Error`]
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// A stable identifier for an advertising endpoint, usually its Bluetooth address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates an identifier from its string form.
    pub fn new(id: impl Into<String>) -> Self {
        DeviceId(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        DeviceId::new(id)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        DeviceId(id)
    }
}

/// One advertisement as delivered by an [`AdvertisementSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingDevice {
    /// The endpoint that sent the advertisement
    pub id: DeviceId,
    /// The decoded advertisement data
    pub adv_data: AdvertisementData,
    /// The signal strength in dBm of the received advertisement packet
    pub rssi: Option<i16>,
    /// The undecoded advertisement payload, when the platform exposes it
    pub raw: Option<Vec<u8>>,
    /// When the advertisement was received
    pub received_at: Instant,
}

impl AdvertisingDevice {
    /// Builds an event from raw advertisement bytes, decoding them with [`AdvertisementData::from_raw`].
    pub fn from_raw(id: impl Into<DeviceId>, rssi: i16, raw: &[u8], received_at: Instant) -> Self {
        AdvertisingDevice {
            id: id.into(),
            adv_data: AdvertisementData::from_raw(raw),
            rssi: Some(rssi),
            raw: Some(raw.to_vec()),
            received_at,
        }
    }

    /// Builds an event from data the platform has already decoded.
    ///
    /// If `adv_data` carries no type codes, the scanner infers them from the fields that are present.
    pub fn from_decoded(
        id: impl Into<DeviceId>,
        rssi: Option<i16>,
        adv_data: AdvertisementData,
        received_at: Instant,
    ) -> Self {
        AdvertisingDevice {
            id: id.into(),
            adv_data,
            rssi,
            raw: None,
            received_at,
        }
    }
}

/// A single received advertisement as stored in a device's advertisement log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// When the advertisement was received
    pub timestamp: Instant,
    /// The signal strength in dBm
    pub rssi: i16,
    /// The decoded advertisement fields
    pub data: AdvertisementData,
    /// The undecoded payload, if the source provided one
    pub raw: Option<Vec<u8>>,
}

impl Advertisement {
    /// Creates an advertisement received at `timestamp`.
    pub fn new(timestamp: Instant, rssi: i16, data: AdvertisementData) -> Self {
        Advertisement {
            timestamp,
            rssi,
            data,
            raw: None,
        }
    }
}

/// Data included in a Bluetooth advertisement or scan reponse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdvertisementData {
    /// The (possibly shortened) local name of the device (CSS §A.1.2)
    pub local_name: Option<String>,
    /// Manufacturer specific data (CSS §A.1.4)
    pub manufacturer_data: Option<ManufacturerData>,
    /// Advertised GATT service UUIDs (CSS §A.1.1)
    pub services: Vec<Uuid>,
    /// Service associated data (CSS §A.1.11)
    pub service_data: HashMap<Uuid, Vec<u8>>,
    /// Transmitted power level (CSS §A.1.5)
    pub tx_power_level: Option<i16>,
    /// Flags (CSS §A.1.3)
    pub flags: Option<u8>,
    /// External appearance (CSS §A.1.12)
    pub appearance: Option<u16>,
    /// Set to true for connectable advertising packets
    pub is_connectable: bool,
    /// Every advertisement data type code seen in the packet, including ones that were not interpreted
    pub ad_types: BTreeSet<u8>,
}

/// Manufacturer specific data included in Bluetooth advertisements. See the Bluetooth Core Specification Supplement
/// §A.1.4 for details.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ManufacturerData {
    /// Company identifier (defined [here](https://www.bluetooth.com/specifications/assigned-numbers/company-identifiers/))
    pub company_id: u16,
    /// Manufacturer specific data
    pub data: Vec<u8>,
}

impl ManufacturerData {
    /// Splits a flat manufacturer payload into its little-endian company identifier and the remaining bytes.
    ///
    /// Returns `None` if `bytes` is too short to hold a company identifier.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [lo, hi, rest @ ..] => Some(ManufacturerData {
                company_id: u16::from_le_bytes([*lo, *hi]),
                data: rest.to_vec(),
            }),
            _ => None,
        }
    }

    /// The payload as it appears on air: company identifier followed by the data.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.data.len() + 2);
        bytes.extend_from_slice(&self.company_id.to_le_bytes());
        bytes.extend_from_slice(&self.data);
        bytes
    }
}
