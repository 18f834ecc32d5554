//! Advertisement data (AD) record decoding.
//!
//! An advertising payload is a sequence of AD structures, each laid out as `[length][type][payload]` where `length`
//! counts the type byte and the payload. See the Bluetooth Core Specification, Vol 3, Part C, §11.

use std::collections::BTreeSet;

use tracing::trace;
use uuid::Uuid;

use crate::{AdvertisementData, BluetoothUuidExt, ManufacturerData};

/// AD type codes (Bluetooth Assigned Numbers §2.3)
pub mod types {
    #![allow(missing_docs)]

    pub const FLAGS: u8 = 0x01;
    pub const INCOMPLETE_16BIT_SERVICE_UUIDS: u8 = 0x02;
    pub const COMPLETE_16BIT_SERVICE_UUIDS: u8 = 0x03;
    pub const INCOMPLETE_32BIT_SERVICE_UUIDS: u8 = 0x04;
    pub const COMPLETE_32BIT_SERVICE_UUIDS: u8 = 0x05;
    pub const INCOMPLETE_128BIT_SERVICE_UUIDS: u8 = 0x06;
    pub const COMPLETE_128BIT_SERVICE_UUIDS: u8 = 0x07;
    pub const SHORTENED_LOCAL_NAME: u8 = 0x08;
    pub const COMPLETE_LOCAL_NAME: u8 = 0x09;
    pub const TX_POWER_LEVEL: u8 = 0x0a;
    pub const CLASS_OF_DEVICE: u8 = 0x0d;
    pub const SOLICITATION_16BIT_UUIDS: u8 = 0x14;
    pub const SOLICITATION_128BIT_UUIDS: u8 = 0x15;
    pub const SERVICE_DATA_16BIT_UUID: u8 = 0x16;
    pub const APPEARANCE: u8 = 0x19;
    pub const ADVERTISING_INTERVAL: u8 = 0x1a;
    pub const LE_DEVICE_ADDRESS: u8 = 0x1b;
    pub const LE_ROLE: u8 = 0x1c;
    pub const SOLICITATION_32BIT_UUIDS: u8 = 0x1f;
    pub const SERVICE_DATA_32BIT_UUID: u8 = 0x20;
    pub const SERVICE_DATA_128BIT_UUID: u8 = 0x21;
    pub const URI: u8 = 0x24;
    pub const MANUFACTURER_SPECIFIC_DATA: u8 = 0xff;
}

/// One AD structure borrowed from a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdStructure<'a> {
    /// The AD type code
    pub ad_type: u8,
    /// The bytes following the type code
    pub data: &'a [u8],
}

/// Iterates the AD structures of a payload, ending at the first structurally invalid record.
///
/// A zero length byte terminates the sequence (this is how controllers pad short payloads), as does a length that
/// runs past the end of the buffer. Everything before the invalid record is still yielded.
#[derive(Debug, Clone)]
pub struct AdStructures<'a> {
    bytes: &'a [u8],
}

impl<'a> AdStructures<'a> {
    /// Creates an iterator over `bytes`.
    pub fn new(bytes: &'a [u8]) -> Self {
        AdStructures { bytes }
    }
}

impl<'a> Iterator for AdStructures<'a> {
    type Item = AdStructure<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (&len, rest) = self.bytes.split_first()?;
        let len = usize::from(len);
        if len == 0 || len > rest.len() {
            if len != 0 {
                trace!(len, remaining = rest.len(), "AD structure overruns payload");
            }
            self.bytes = &[];
            return None;
        }

        let (record, rest) = rest.split_at(len);
        self.bytes = rest;
        Some(AdStructure {
            ad_type: record[0],
            data: &record[1..],
        })
    }
}

impl AdvertisementData {
    /// Decodes a raw advertising payload.
    ///
    /// Decoding is best effort and never fails: it stops at the first malformed AD structure and returns the fields
    /// parsed up to that point. Every type code encountered is recorded in [`ad_types`][Self::ad_types], whether or
    /// not it is interpreted.
    pub fn from_raw(bytes: &[u8]) -> Self {
        let mut adv = AdvertisementData::default();

        for AdStructure { ad_type, data } in AdStructures::new(bytes) {
            adv.ad_types.insert(ad_type);

            match ad_type {
                types::FLAGS => {
                    if let Some(&flags) = data.first() {
                        adv.flags = Some(flags);
                    }
                }
                types::INCOMPLETE_16BIT_SERVICE_UUIDS | types::COMPLETE_16BIT_SERVICE_UUIDS => {
                    push_uuids(&mut adv.services, data, 2);
                }
                types::INCOMPLETE_32BIT_SERVICE_UUIDS | types::COMPLETE_32BIT_SERVICE_UUIDS => {
                    push_uuids(&mut adv.services, data, 4);
                }
                types::INCOMPLETE_128BIT_SERVICE_UUIDS | types::COMPLETE_128BIT_SERVICE_UUIDS => {
                    push_uuids(&mut adv.services, data, 16);
                }
                types::SHORTENED_LOCAL_NAME | types::COMPLETE_LOCAL_NAME => {
                    let name = String::from_utf8_lossy(data);
                    let name = name.trim_end_matches('\0');
                    // a complete name wins over a shortened one in the same packet
                    if !name.is_empty() && (ad_type == types::COMPLETE_LOCAL_NAME || adv.local_name.is_none()) {
                        adv.local_name = Some(name.to_string());
                    }
                }
                types::TX_POWER_LEVEL => {
                    if let Some(&level) = data.first() {
                        adv.tx_power_level = Some(i16::from(level as i8));
                    }
                }
                types::SERVICE_DATA_16BIT_UUID => insert_service_data(&mut adv, data, 2),
                types::SERVICE_DATA_32BIT_UUID => insert_service_data(&mut adv, data, 4),
                types::SERVICE_DATA_128BIT_UUID => insert_service_data(&mut adv, data, 16),
                types::APPEARANCE => {
                    if let [lo, hi, ..] = data {
                        adv.appearance = Some(u16::from_le_bytes([*lo, *hi]));
                    }
                }
                types::MANUFACTURER_SPECIFIC_DATA => {
                    if let Some(manufacturer_data) = ManufacturerData::from_bytes(data) {
                        adv.manufacturer_data = Some(manufacturer_data);
                    }
                }
                _ => (),
            }
        }

        adv
    }

    /// Infers the AD type codes present from the decoded fields.
    ///
    /// Used for platforms that only expose decoded data. The exact variant of a field (shortened vs. complete name,
    /// UUID width) can't be recovered, so the most common code is assumed.
    pub fn infer_ad_types(&self) -> BTreeSet<u8> {
        let mut ad_types = BTreeSet::new();
        if self.flags.is_some() {
            ad_types.insert(types::FLAGS);
        }
        if self.local_name.as_deref().is_some_and(|name| !name.is_empty()) {
            ad_types.insert(types::COMPLETE_LOCAL_NAME);
        }
        if self.manufacturer_data.is_some() {
            ad_types.insert(types::MANUFACTURER_SPECIFIC_DATA);
        }
        if !self.services.is_empty() {
            ad_types.insert(types::COMPLETE_16BIT_SERVICE_UUIDS);
        }
        if !self.service_data.is_empty() {
            ad_types.insert(types::SERVICE_DATA_16BIT_UUID);
        }
        if self.tx_power_level.is_some() {
            ad_types.insert(types::TX_POWER_LEVEL);
        }
        if self.appearance.is_some() {
            ad_types.insert(types::APPEARANCE);
        }
        ad_types
    }
}

fn push_uuids(services: &mut Vec<Uuid>, data: &[u8], width: usize) {
    for chunk in data.chunks_exact(width) {
        if let Some(uuid) = Uuid::from_le_bluetooth_bytes(chunk) {
            if !services.contains(&uuid) {
                services.push(uuid);
            }
        }
    }
}

fn insert_service_data(adv: &mut AdvertisementData, data: &[u8], width: usize) {
    if data.len() < width {
        return;
    }
    let (uuid, payload) = data.split_at(width);
    if let Some(uuid) = Uuid::from_le_bluetooth_bytes(uuid) {
        adv.service_data.insert(uuid, payload.to_vec());
    }
}
