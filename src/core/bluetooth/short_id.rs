//! Bluetooth SIG short IDs and the 128-bit UUIDs they expand to.

use std::fmt;

use uuid::Uuid;

/// Bluetooth_Base_UUID, `00000000-0000-1000-8000-00805F9B34FB`.
const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

/// Expands a 16-bit assigned number into its full UUID.
pub const fn uuid_from_short_id(short_id: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short_id as u128) << 96))
}

/// Same as [`uuid_from_short_id`], rendered as a lower-case hyphenated string.
pub fn short_id_to_uuid_string(short_id: u16) -> String {
    uuid_from_short_id(short_id).hyphenated().to_string()
}

/// A service or characteristic identifier: either an assigned number or a full UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GattId {
    Short(u16),
    Uuid(Uuid),
}

impl GattId {
    pub fn uuid(&self) -> Uuid {
        match self {
            GattId::Short(id) => uuid_from_short_id(*id),
            GattId::Uuid(uuid) => *uuid,
        }
    }
}

impl From<u16> for GattId {
    fn from(id: u16) -> Self {
        GattId::Short(id)
    }
}

impl From<Uuid> for GattId {
    fn from(uuid: Uuid) -> Self {
        GattId::Uuid(uuid)
    }
}

impl fmt::Display for GattId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GattId::Short(id) => write!(f, "{:#06x}", id),
            GattId::Uuid(uuid) => write!(f, "{}", uuid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::constants::UUID_BATTERY_LEVEL;
    use std::collections::HashSet;

    #[test]
    fn test_battery_service_uuid() {
        assert_eq!(
            short_id_to_uuid_string(0x180F),
            "0000180f-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_short_id_matches_known_characteristic() {
        assert_eq!(GattId::Short(0x2A19).uuid(), UUID_BATTERY_LEVEL);
        assert_eq!(GattId::from(UUID_BATTERY_LEVEL).uuid(), UUID_BATTERY_LEVEL);
    }

    #[test]
    fn test_resolver_is_injective() {
        let all: HashSet<Uuid> = (0..=u16::MAX).map(uuid_from_short_id).collect();
        assert_eq!(all.len(), 1 << 16);
    }

    #[test]
    fn test_extremes_keep_base_template() {
        assert_eq!(
            short_id_to_uuid_string(0x0000),
            "00000000-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            short_id_to_uuid_string(0xFFFF),
            "0000ffff-0000-1000-8000-00805f9b34fb"
        );
    }
}
