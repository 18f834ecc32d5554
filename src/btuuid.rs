//! `Uuid` extensions for Bluetooth UUIDs

use uuid::Uuid;

/// This is the Bluetooth Base UUID. It is used with 16-bit and 32-bit UUIDs
/// [defined](https://www.bluetooth.com/specifications/assigned-numbers/) by the Bluetooth SIG.
pub const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

/// Const function to create a 16-bit Bluetooth UUID
pub const fn bluetooth_uuid_from_u16(uuid: u16) -> Uuid {
    Uuid::from_u128(((uuid as u128) << 96) | BLUETOOTH_BASE_UUID)
}

/// Const function to create a 32-bit Bluetooth UUID
pub const fn bluetooth_uuid_from_u32(uuid: u32) -> Uuid {
    Uuid::from_u128(((uuid as u128) << 96) | BLUETOOTH_BASE_UUID)
}

/// Extension trait for [uuid::Uuid] with helper methods for dealing with Bluetooth 16-bit and 32-bit UUIDs
pub trait BluetoothUuidExt: private::Sealed + Sized {
    /// Creates a 16-bit Bluetooth UUID
    fn from_u16(uuid: u16) -> Self;

    /// Creates a 32-bit Bluetooth UUID
    fn from_u32(uuid: u32) -> Self;

    /// Creates a UUID from the little-endian octets used inside advertisement data.
    ///
    /// Returns `None` unless `bytes.len()` is one of 2, 4, or 16.
    fn from_le_bluetooth_bytes(bytes: &[u8]) -> Option<Self>;

    /// Returns `true` if self is a valid 16-bit Bluetooth UUID
    fn is_u16_uuid(&self) -> bool;

    /// Returns `true` if self is a valid 32-bit Bluetooth UUID
    fn is_u32_uuid(&self) -> bool;

    /// Tries to convert self into a 16-bit Bluetooth UUID
    fn try_to_u16(&self) -> Option<u16>;

    /// Tries to convert self into a 32-bit Bluetooth UUID
    fn try_to_u32(&self) -> Option<u32>;

    /// Formats the UUID in its shortest Bluetooth form: 4 hex digits for 16-bit UUIDs, 8 for 32-bit UUIDs and the
    /// hyphenated form otherwise.
    fn to_short_string(&self) -> String;
}

impl BluetoothUuidExt for Uuid {
    fn from_u16(uuid: u16) -> Self {
        bluetooth_uuid_from_u16(uuid)
    }

    fn from_u32(uuid: u32) -> Self {
        bluetooth_uuid_from_u32(uuid)
    }

    fn from_le_bluetooth_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes.len() {
            2 => Some(Self::from_u16(u16::from_le_bytes([bytes[0], bytes[1]]))),
            4 => Some(Self::from_u32(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))),
            16 => {
                let mut be = [0u8; 16];
                be.copy_from_slice(bytes);
                be.reverse();
                Some(Self::from_bytes(be))
            }
            _ => None,
        }
    }

    fn is_u16_uuid(&self) -> bool {
        let u = self.as_u128();
        (u & ((1 << 96) - 1)) == BLUETOOTH_BASE_UUID && (((u >> 96) as u32) & 0xffff0000) == 0
    }

    fn is_u32_uuid(&self) -> bool {
        let u = self.as_u128();
        (u & ((1 << 96) - 1)) == BLUETOOTH_BASE_UUID
    }

    fn try_to_u16(&self) -> Option<u16> {
        let u = self.as_u128();
        self.is_u16_uuid().then(|| (u >> 96) as u16)
    }

    fn try_to_u32(&self) -> Option<u32> {
        let u = self.as_u128();
        self.is_u32_uuid().then(|| (u >> 96) as u32)
    }

    fn to_short_string(&self) -> String {
        if let Some(short) = self.try_to_u16() {
            format!("{short:04x}")
        } else if let Some(short) = self.try_to_u32() {
            format!("{short:08x}")
        } else {
            self.hyphenated().to_string()
        }
    }
}

mod private {
    use uuid::Uuid;

    pub trait Sealed {}

    impl Sealed for Uuid {}
}

/// Bluetooth GATT Service 16-bit UUIDs
pub mod services {
    #![allow(missing_docs)]

    use uuid::Uuid;

    use super::bluetooth_uuid_from_u16;

    pub const GENERIC_ACCESS: Uuid = bluetooth_uuid_from_u16(0x1800);
    pub const GENERIC_ATTRIBUTE: Uuid = bluetooth_uuid_from_u16(0x1801);
    pub const IMMEDIATE_ALERT: Uuid = bluetooth_uuid_from_u16(0x1802);
    pub const TX_POWER: Uuid = bluetooth_uuid_from_u16(0x1804);
    pub const DEVICE_INFORMATION: Uuid = bluetooth_uuid_from_u16(0x180A);
    pub const HEART_RATE: Uuid = bluetooth_uuid_from_u16(0x180D);
    pub const BATTERY: Uuid = bluetooth_uuid_from_u16(0x180F);
    pub const HUMAN_INTERFACE_DEVICE: Uuid = bluetooth_uuid_from_u16(0x1812);
    pub const ENVIRONMENTAL_SENSING: Uuid = bluetooth_uuid_from_u16(0x181A);
    pub const EXPOSURE_NOTIFICATION: Uuid = bluetooth_uuid_from_u16(0xFD6F);
    pub const GOOGLE_FAST_PAIR: Uuid = bluetooth_uuid_from_u16(0xFE2C);
    pub const EDDYSTONE: Uuid = bluetooth_uuid_from_u16(0xFEAA);
}
