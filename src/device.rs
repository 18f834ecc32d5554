//! Per-device aggregation of advertisements.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::ad::types;
use crate::manufacturer::manufacturer_name;
use crate::{Advertisement, BluetoothUuidExt, DeviceId, ManufacturerData};

/// Number of RSSI samples kept per device
pub const RSSI_HISTORY_CAPACITY: usize = 20;

/// Number of advertisements kept per device
pub const ADVERTISEMENT_LOG_CAPACITY: usize = 100;

/// Minimum number of logged advertisements before an interval is inferred
const MIN_INTERVAL_SAMPLES: usize = 5;

/// Minimum number of plausible gaps before an interval is inferred
const MIN_VALID_GAPS: usize = 3;

/// Gaps shorter than this are duplicate deliveries or reordering. The shortest legal BLE advertising interval is
/// 20 ms.
const MIN_PLAUSIBLE_GAP: Duration = Duration::from_millis(10);

/// Gaps at or above this are treated as lost advertisements or scan window gaps.
const MAX_PLAUSIBLE_GAP: Duration = Duration::from_secs(10);

/// AD types shown in dedicated columns of the device list
const COLUMN_AD_TYPES: &[u8] = &[
    types::FLAGS,
    types::INCOMPLETE_16BIT_SERVICE_UUIDS,
    types::COMPLETE_16BIT_SERVICE_UUIDS,
    types::INCOMPLETE_128BIT_SERVICE_UUIDS,
    types::COMPLETE_128BIT_SERVICE_UUIDS,
    types::SHORTENED_LOCAL_NAME,
    types::COMPLETE_LOCAL_NAME,
    types::SERVICE_DATA_16BIT_UUID,
    types::APPEARANCE,
    types::SERVICE_DATA_32BIT_UUID,
    types::SERVICE_DATA_128BIT_UUID,
    types::MANUFACTURER_SPECIFIC_DATA,
];

/// AD types with a well known meaning
const KNOWN_AD_TYPES: &[u8] = &[
    types::FLAGS,
    types::INCOMPLETE_16BIT_SERVICE_UUIDS,
    types::COMPLETE_16BIT_SERVICE_UUIDS,
    types::INCOMPLETE_128BIT_SERVICE_UUIDS,
    types::COMPLETE_128BIT_SERVICE_UUIDS,
    types::SHORTENED_LOCAL_NAME,
    types::COMPLETE_LOCAL_NAME,
    types::TX_POWER_LEVEL,
    types::CLASS_OF_DEVICE,
    types::SOLICITATION_16BIT_UUIDS,
    types::SOLICITATION_128BIT_UUIDS,
    types::SERVICE_DATA_16BIT_UUID,
    types::APPEARANCE,
    types::ADVERTISING_INTERVAL,
    types::LE_DEVICE_ADDRESS,
    types::LE_ROLE,
    types::SOLICITATION_32BIT_UUIDS,
    types::SERVICE_DATA_32BIT_UUID,
    types::SERVICE_DATA_128BIT_UUID,
    types::URI,
    types::MANUFACTURER_SPECIFIC_DATA,
];

/// An aggregated view of one advertising device.
///
/// Values of this type handed out by the registry are independent copies; they never change after they are returned.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    /// The device identity
    pub id: DeviceId,
    /// The most recent non-empty advertised name
    pub name: Option<String>,
    /// The most recent RSSI samples, oldest first
    pub rssi_history: VecDeque<i16>,
    /// The RSSI of the latest advertisement
    pub rssi_current: i16,
    /// The mean of [`rssi_history`][Self::rssi_history]
    pub rssi_average: f64,
    /// The most recent advertisements, oldest first
    pub advertisements: VecDeque<Advertisement>,
    /// When the device was first seen
    pub first_seen: Instant,
    /// When the device was last seen
    pub last_seen: Instant,
    /// The median gap between advertisements, `None` until enough plausible samples exist
    pub adv_interval: Option<Duration>,
    /// Number of advertisements received
    pub adv_count: u64,
    /// The most recent manufacturer specific data
    pub manufacturer_data: Option<ManufacturerData>,
    /// The most recent non-empty list of advertised services
    pub services: Vec<Uuid>,
    /// Service data merged across advertisements
    pub service_data: HashMap<Uuid, Vec<u8>>,
    /// The most recent transmit power level
    pub tx_power_level: Option<i16>,
    /// The most recent flags
    pub flags: Option<u8>,
    /// The most recent appearance
    pub appearance: Option<u16>,
    /// Whether the latest advertisement was connectable
    pub is_connectable: bool,
    /// Every AD type code seen from this device
    pub ad_types: BTreeSet<u8>,
}

/// A named advertisement field with a display value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdField {
    /// Field name
    pub name: &'static str,
    /// Display value
    pub value: String,
}

/// The mutable aggregate owned by the registry for one device.
#[derive(Debug)]
pub struct DeviceState {
    device: Device,
}

impl DeviceState {
    /// Creates an empty aggregate for `id`, first seen at `first_seen`.
    pub fn new(id: DeviceId, first_seen: Instant) -> Self {
        DeviceState {
            device: Device {
                id,
                name: None,
                rssi_history: VecDeque::with_capacity(RSSI_HISTORY_CAPACITY + 1),
                rssi_current: 0,
                rssi_average: 0.0,
                advertisements: VecDeque::new(),
                first_seen,
                last_seen: first_seen,
                adv_interval: None,
                adv_count: 0,
                manufacturer_data: None,
                services: Vec::new(),
                service_data: HashMap::new(),
                tx_power_level: None,
                flags: None,
                appearance: None,
                is_connectable: false,
                ad_types: BTreeSet::new(),
            },
        }
    }

    /// Applies one advertisement.
    ///
    /// Sticky fields (name, manufacturer data, services, transmit power, flags, appearance) are only replaced when the
    /// advertisement carries a value for them. `last_seen` never moves backwards, so a late delivery cannot make a
    /// device look older than it is.
    pub fn update(&mut self, adv: Advertisement) {
        let d = &mut self.device;

        d.last_seen = d.last_seen.max(adv.timestamp);
        d.adv_count += 1;

        if let Some(name) = adv.data.local_name.as_ref().filter(|name| !name.is_empty()) {
            d.name = Some(name.clone());
        }

        d.rssi_current = adv.rssi;
        d.rssi_history.push_back(adv.rssi);
        while d.rssi_history.len() > RSSI_HISTORY_CAPACITY {
            d.rssi_history.pop_front();
        }
        d.rssi_average = mean(&d.rssi_history);

        if let Some(manufacturer_data) = &adv.data.manufacturer_data {
            d.manufacturer_data = Some(manufacturer_data.clone());
        }

        if !adv.data.services.is_empty() {
            d.services = adv.data.services.clone();
        }
        for (uuid, data) in &adv.data.service_data {
            d.service_data.insert(*uuid, data.clone());
        }

        if adv.data.tx_power_level.is_some() {
            d.tx_power_level = adv.data.tx_power_level;
        }
        if adv.data.flags.is_some() {
            d.flags = adv.data.flags;
        }
        if adv.data.appearance.is_some() {
            d.appearance = adv.data.appearance;
        }
        d.is_connectable = adv.data.is_connectable;

        d.ad_types.extend(adv.data.ad_types.iter().copied());

        d.advertisements.push_back(adv);
        while d.advertisements.len() > ADVERTISEMENT_LOG_CAPACITY {
            d.advertisements.pop_front();
        }

        d.adv_interval = infer_interval(d.advertisements.iter().map(|adv| adv.timestamp));
    }

    /// When the device was last seen
    pub fn last_seen(&self) -> Instant {
        self.device.last_seen
    }

    /// A borrowed view of the aggregate
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// An independent copy of the aggregate
    pub fn snapshot(&self) -> Device {
        self.device.clone()
    }
}

fn mean(samples: &VecDeque<i16>) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: i64 = samples.iter().map(|&x| i64::from(x)).sum();
    sum as f64 / samples.len() as f64
}

/// Infers the advertising interval from arrival times, oldest first.
///
/// Needs at least five arrivals and three gaps in the plausible range; the result is the median gap, which shrugs off
/// the occasional long gap from a lost packet.
pub fn infer_interval(timestamps: impl ExactSizeIterator<Item = Instant>) -> Option<Duration> {
    if timestamps.len() < MIN_INTERVAL_SAMPLES {
        return None;
    }

    let mut gaps = Vec::with_capacity(timestamps.len() - 1);
    let mut prev: Option<Instant> = None;
    for ts in timestamps {
        if let Some(prev) = prev {
            let gap = ts.saturating_duration_since(prev);
            if (MIN_PLAUSIBLE_GAP..MAX_PLAUSIBLE_GAP).contains(&gap) {
                gaps.push(gap);
            }
        }
        prev = Some(ts);
    }

    if gaps.len() < MIN_VALID_GAPS {
        return None;
    }
    Some(median(&mut gaps))
}

fn median(values: &mut [Duration]) -> Duration {
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2
    } else {
        values[mid]
    }
}

impl Device {
    /// The advertised name, or the identity if no name has been seen.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }

    /// The registered name of the device's manufacturer, if it has sent manufacturer data.
    pub fn manufacturer_name(&self) -> Option<String> {
        self.manufacturer_data.as_ref().map(|m| manufacturer_name(m.company_id))
    }

    /// Describes the flags field, e.g. `LE-Gen,BR/EDR`.
    pub fn flags_description(&self) -> Option<String> {
        const NAMES: [(u8, &str); 5] = [
            (0x01, "LE-Ltd"),
            (0x02, "LE-Gen"),
            (0x04, "BR/EDR"),
            (0x08, "LE-BR/EDR-Ctrl"),
            (0x10, "LE-BR/EDR-Host"),
        ];

        let flags = self.flags?;
        let parts: Vec<&str> = NAMES
            .iter()
            .filter(|(bit, _)| flags & bit != 0)
            .map(|(_, name)| *name)
            .collect();
        if parts.is_empty() {
            Some(format!("0x{flags:02x}"))
        } else {
            Some(parts.join(","))
        }
    }

    /// The appearance category (upper 10 bits of the appearance value).
    pub fn appearance_category(&self) -> Option<String> {
        let appearance = self.appearance?;
        let name = match appearance >> 6 {
            0 => "Unknown",
            1 => "Phone",
            2 => "Computer",
            3 => "Watch",
            4 => "Clock",
            5 => "Display",
            6 => "Remote",
            7 => "Eye-glasses",
            8 => "Tag",
            9 => "Keyring",
            10 => "Media Player",
            11 => "Barcode Scanner",
            12 => "Thermometer",
            13 => "Heart Rate",
            14 => "Blood Pressure",
            15 => "HID",
            16 => "Glucose",
            17 => "Running/Walking",
            18 => "Cycling",
            49 => "Pulse Oximeter",
            50 => "Weight Scale",
            51 => "Personal Mobility",
            52 => "Continuous Glucose",
            53 => "Insulin Pump",
            54 => "Medication Delivery",
            81 => "Outdoor Sports",
            _ => return Some(format!("0x{appearance:04x}")),
        };
        Some(name.to_string())
    }

    /// AD types seen from this device that have no dedicated display column.
    pub fn other_ad_types(&self) -> Vec<u8> {
        self.ad_types
            .iter()
            .copied()
            .filter(|t| !COLUMN_AD_TYPES.contains(t))
            .collect()
    }

    /// AD types seen from this device that are not among the commonly interpreted types.
    pub fn unknown_ad_types(&self) -> Vec<u8> {
        self.ad_types
            .iter()
            .copied()
            .filter(|t| !KNOWN_AD_TYPES.contains(t))
            .collect()
    }

    /// The decoded fields of this device with display values, for detail views.
    pub fn ad_fields(&self) -> Vec<AdField> {
        let mut fields = Vec::new();

        if let Some(name) = &self.name {
            fields.push(AdField {
                name: "Local Name",
                value: name.clone(),
            });
        }

        if let Some(m) = &self.manufacturer_data {
            let mut value = manufacturer_name(m.company_id);
            if !m.data.is_empty() {
                value.push_str(&format!(" [{}]", hex::encode(&m.data)));
            }
            fields.push(AdField {
                name: "Manufacturer Data",
                value,
            });
        }

        if !self.services.is_empty() {
            let uuids: Vec<String> = self.services.iter().map(|u| u.to_short_string()).collect();
            fields.push(AdField {
                name: "Service UUIDs",
                value: uuids.join(", "),
            });
        }

        if !self.service_data.is_empty() {
            let mut entries: Vec<(&Uuid, &Vec<u8>)> = self.service_data.iter().collect();
            entries.sort();
            let parts: Vec<String> = entries
                .into_iter()
                .map(|(uuid, data)| format!("{}:[{}]", uuid.to_short_string(), hex::encode(data)))
                .collect();
            fields.push(AdField {
                name: "Service Data",
                value: parts.join(", "),
            });
        }

        if let Some(level) = self.tx_power_level {
            fields.push(AdField {
                name: "TX Power",
                value: format!("{level} dBm"),
            });
        }

        fields
    }

    /// The raw payload of the most recent advertisement as lowercase hex, if the source provided one.
    pub fn raw_data_hex(&self) -> Option<String> {
        self.advertisements
            .back()
            .and_then(|adv| adv.raw.as_deref())
            .filter(|raw| !raw.is_empty())
            .map(hex::encode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btuuid::services;
    use crate::AdvertisementData;

    fn adv_at(base: Instant, offset_ms: u64, rssi: i16) -> Advertisement {
        Advertisement::new(base + Duration::from_millis(offset_ms), rssi, AdvertisementData::default())
    }

    fn state_with_offsets(offsets: &[u64]) -> DeviceState {
        let base = Instant::now();
        let mut state = DeviceState::new(DeviceId::new("AA:BB:CC:DD:EE:FF"), base);
        for &offset in offsets {
            state.update(adv_at(base, offset, -70));
        }
        state
    }

    #[test]
    fn rssi_history_is_bounded_fifo() {
        let base = Instant::now();
        let mut state = DeviceState::new(DeviceId::new("dev"), base);
        for i in 1..=21i16 {
            state.update(adv_at(base, i as u64 * 100, -i));
        }

        let d = state.device();
        assert_eq!(d.rssi_history.len(), RSSI_HISTORY_CAPACITY);
        assert_eq!(d.rssi_history.iter().copied().collect::<Vec<_>>(), (2..=21).map(|i| -i).collect::<Vec<i16>>());
        assert_eq!(d.rssi_current, -21);
        let expected = d.rssi_history.iter().map(|&x| f64::from(x)).sum::<f64>() / 20.0;
        assert_eq!(d.rssi_average, expected);
        assert_eq!(d.adv_count, 21);
    }

    #[test]
    fn advertisement_log_is_bounded() {
        let offsets: Vec<u64> = (0..150).map(|i| i * 20).collect();
        let state = state_with_offsets(&offsets);
        assert_eq!(state.device().advertisements.len(), ADVERTISEMENT_LOG_CAPACITY);
        assert_eq!(state.device().adv_count, 150);
    }

    #[test]
    fn interval_is_median_of_plausible_gaps() {
        let state = state_with_offsets(&[0, 50, 100, 150, 200]);
        assert_eq!(state.device().adv_interval, Some(Duration::from_millis(50)));

        // the 5 ms gap is discarded
        let state = state_with_offsets(&[0, 5, 55, 105, 155]);
        assert_eq!(state.device().adv_interval, Some(Duration::from_millis(50)));

        // one lost packet doesn't move the median
        let state = state_with_offsets(&[0, 100, 200, 400, 500, 600]);
        assert_eq!(state.device().adv_interval, Some(Duration::from_millis(100)));
    }

    #[test]
    fn interval_even_count_averages_middle() {
        let state = state_with_offsets(&[0, 40, 100, 170, 250]);
        // gaps 40, 60, 70, 80
        assert_eq!(state.device().adv_interval, Some(Duration::from_millis(65)));
    }

    #[test]
    fn interval_unknown_without_enough_samples() {
        assert_eq!(state_with_offsets(&[0, 50, 100, 150]).device().adv_interval, None);
        // only two gaps survive the range filter
        assert_eq!(state_with_offsets(&[0, 2, 4, 54, 104]).device().adv_interval, None);
        assert_eq!(state_with_offsets(&[0, 50, 100, 10_100, 20_100]).device().adv_interval, None);
    }

    #[test]
    fn late_delivery_does_not_rewind_last_seen() {
        let base = Instant::now();
        let mut state = DeviceState::new(DeviceId::new("dev"), base);
        state.update(adv_at(base, 1000, -50));
        state.update(adv_at(base, 500, -55));
        assert_eq!(state.last_seen(), base + Duration::from_millis(1000));
        assert_eq!(state.device().first_seen, base);
        assert_eq!(state.device().adv_count, 2);
    }

    #[test]
    fn sticky_fields_survive_sparse_advertisements() {
        let base = Instant::now();
        let mut state = DeviceState::new(DeviceId::new("dev"), base);

        let mut full = AdvertisementData {
            local_name: Some("Band".to_string()),
            manufacturer_data: Some(ManufacturerData {
                company_id: 0x0157,
                data: vec![0xaa],
            }),
            services: vec![services::HEART_RATE],
            tx_power_level: Some(-4),
            flags: Some(0x06),
            appearance: Some(0x00c1),
            is_connectable: true,
            ..Default::default()
        };
        full.service_data.insert(services::BATTERY, vec![0x50]);
        full.ad_types = full.infer_ad_types();
        state.update(Advertisement::new(base, -60, full));

        let mut sparse = AdvertisementData {
            local_name: Some(String::new()),
            ..Default::default()
        };
        sparse.service_data.insert(services::HEART_RATE, vec![0x48]);
        sparse.ad_types.insert(0x2a);
        state.update(Advertisement::new(base + Duration::from_millis(100), -62, sparse));

        let d = state.snapshot();
        assert_eq!(d.name.as_deref(), Some("Band"));
        assert_eq!(d.manufacturer_data.as_ref().map(|m| m.company_id), Some(0x0157));
        assert_eq!(d.services, vec![services::HEART_RATE]);
        assert_eq!(d.service_data.len(), 2);
        assert_eq!(d.service_data[&services::BATTERY], vec![0x50]);
        assert_eq!(d.tx_power_level, Some(-4));
        assert_eq!(d.flags, Some(0x06));
        assert_eq!(d.appearance, Some(0x00c1));
        assert!(!d.is_connectable);
        assert!(d.ad_types.contains(&0x2a) && d.ad_types.contains(&0xff));
    }

    #[test]
    fn formatters() {
        let base = Instant::now();
        let mut state = DeviceState::new(DeviceId::new("11:22:33:44:55:66"), base);
        let mut data = AdvertisementData::from_raw(&[
            0x02, 0x01, 0x06, 0x03, 0x19, 0xc1, 0x00, 0x02, 0x2a, 0x01, 0x02, 0x0a, 0x08,
        ]);
        data.manufacturer_data = Some(ManufacturerData {
            company_id: 0x004c,
            data: vec![0x12, 0x02],
        });
        let mut adv = Advertisement::new(base, -40, data);
        adv.raw = Some(vec![0x02, 0x01, 0x06]);
        state.update(adv);

        let d = state.snapshot();
        assert_eq!(d.display_name(), "11:22:33:44:55:66");
        assert_eq!(d.flags_description().as_deref(), Some("LE-Gen,BR/EDR"));
        assert_eq!(d.appearance_category().as_deref(), Some("Watch"));
        assert_eq!(d.other_ad_types(), vec![0x0a, 0x2a]);
        assert_eq!(d.unknown_ad_types(), vec![0x2a]);
        assert_eq!(d.raw_data_hex().as_deref(), Some("020106"));
        assert_eq!(
            d.ad_fields(),
            vec![
                AdField {
                    name: "Manufacturer Data",
                    value: "Apple, Inc. [1202]".to_string()
                },
                AdField {
                    name: "TX Power",
                    value: "8 dBm".to_string()
                },
            ]
        );
    }
}
