//! Bluetooth functionality for the blood pressure monitor
//! This module handles all bluetooth operations including scanning,
//! connecting, resolving GATT handles and receiving measurement frames.

pub mod adapter;
pub mod battery;
pub mod bluest_adapter;
pub mod commands;
pub mod connection;
pub mod constants;
pub mod error;
pub mod notification;
pub mod resolver;
pub mod scanner;
pub mod short_id;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

// Re-export types that should be publicly accessible
pub use adapter::BleAdapter;
pub use bluest_adapter::BluestAdapter;
pub use commands::{CommandSender, FeatureCommand};
pub use connection::ConnectionManager;
pub use error::{BpError, BpResult};
pub use short_id::{GattId, short_id_to_uuid_string, uuid_from_short_id};
pub use types::{CharacteristicHandle, ConnectionState, DeviceHandle, ServiceHandle};
