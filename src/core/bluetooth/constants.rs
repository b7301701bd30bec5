//! Constants used throughout the monitor
//! This module contains the wire-level values of the QardioARM cuff:
//! GATT identifiers, feature commands, frame offsets and timing defaults.

use uuid::Uuid;

/// Advertised name of the QardioARM cuff
pub const DEVICE_NAME: &str = "QardioARM";

/// Battery service short ID
pub const BATTERY_SERVICE_ID: u16 = 0x180F;

/// Battery level characteristic
pub const UUID_BATTERY_LEVEL: Uuid = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);

/// Blood pressure service short ID
pub const BLOOD_PRESSURE_SERVICE_ID: u16 = 0x1810;

/// Blood pressure measurement characteristic short ID (notify)
pub const BLOOD_PRESSURE_MEASUREMENT_ID: u16 = 0x2A35;

/// Vendor feature characteristic used to start and cancel a reading
pub const UUID_BLOOD_PRESSURE_FEATURE: Uuid =
    Uuid::from_u128(0x583cb5b3_875d_40ed_9098_c39eb0c1983d);

/// Feature command value that starts cuff inflation
pub const FEATURE_START_READING: u16 = 0x01F1;

/// Feature command value that cancels an in-flight reading
pub const FEATURE_CANCEL_READING: u16 = 0x02F1;

/// Scan duration in milliseconds
pub const DEFAULT_SCAN_TIMEOUT_MS: u64 = 3000;

/// Grace interval after the final frame, letting the cuff finish deflating
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 3000;

/// Deadline for a whole measurement session in seconds
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 180;
