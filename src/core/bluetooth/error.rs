//! Error taxonomy for the blood pressure monitor core.

use thiserror::Error;
use uuid::Uuid;

/// Hint shown when the cuff stops answering writes mid-session.
pub const WRITE_FAILED_HINT: &str =
    "Check that the monitor is still paired and not too far away. Try closing and reopening the cuff, or re-pair the monitor.";

/// Hint shown when the cuff cannot be found or reached.
pub const UNREACHABLE_HINT: &str =
    "Ensure the monitor has charged batteries, then close and reopen the cuff to switch it on.";

#[derive(Debug, Error)]
pub enum BpError {
    #[error("Device '{0}' not found")]
    DeviceNotFound(String),

    #[error("Failed to connect to device: {0}")]
    ConnectFailed(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(Uuid),

    #[error("Characteristic {characteristic} not found in service {service}")]
    CharacteristicNotFound { service: Uuid, characteristic: Uuid },

    #[error("{count} characteristics share UUID {characteristic} in service {service}")]
    AmbiguousMatch {
        service: Uuid,
        characteristic: Uuid,
        count: usize,
    },

    #[error("Not connected to a blood pressure monitor")]
    NotConnected,

    #[error("Characteristic {0} does not support notifications")]
    NotificationUnsupported(Uuid),

    #[error("Failed to write to characteristic {characteristic}: {reason}")]
    WriteFailed { characteristic: Uuid, reason: String },

    #[error("Failed to read characteristic {characteristic}: {reason}")]
    ReadFailed { characteristic: Uuid, reason: String },

    #[error("Battery level {0} is outside 0-100")]
    InvalidBatteryLevel(u8),

    #[error("A blood pressure reading is already in progress")]
    SessionAlreadyActive,

    #[error("No complete reading arrived within {0} seconds")]
    SessionTimedOut(u64),

    #[error("Bluetooth permissions are not granted")]
    PermissionDenied,

    #[error("Bluetooth adapter unavailable: {0}")]
    AdapterUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BpError {
    /// Operator-facing advice for the failures a user can fix by hand.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::WriteFailed { .. } | Self::SessionTimedOut(_) => Some(WRITE_FAILED_HINT),
            Self::DeviceNotFound(_) | Self::ConnectFailed(_) => Some(UNREACHABLE_HINT),
            _ => None,
        }
    }
}

impl From<bluest::Error> for BpError {
    fn from(e: bluest::Error) -> Self {
        BpError::AdapterUnavailable(e.to_string())
    }
}

pub type BpResult<T> = std::result::Result<T, BpError>;
