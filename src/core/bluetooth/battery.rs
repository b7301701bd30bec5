//! One-shot battery level read.

use std::sync::Arc;

use log::{error, info};

use crate::core::bluetooth::adapter::BleAdapter;
use crate::core::bluetooth::error::{BpError, BpResult};
use crate::core::bluetooth::types::CharacteristicHandle;

pub struct BatteryReader<A: BleAdapter> {
    adapter: Arc<A>,
}

impl<A: BleAdapter> BatteryReader<A> {
    pub fn new(adapter: Arc<A>) -> Self {
        Self { adapter }
    }

    /// Reads the battery percentage. A failed or malformed read is an error,
    /// never a made-up 0%.
    pub async fn read_battery(&self, characteristic: &CharacteristicHandle<A>) -> BpResult<u8> {
        let raw = characteristic.characteristic()?;
        let uuid = characteristic.uuid();
        if !characteristic.flags().readable {
            return Err(BpError::ReadFailed {
                characteristic: uuid,
                reason: "characteristic is not readable".into(),
            });
        }

        let data = self.adapter.read(raw).await.map_err(|e| {
            error!("Failed to read battery level: {}", e);
            match e {
                BpError::ReadFailed { .. } | BpError::NotConnected => e,
                other => BpError::ReadFailed {
                    characteristic: uuid,
                    reason: other.to_string(),
                },
            }
        })?;

        let level = *data.first().ok_or_else(|| BpError::ReadFailed {
            characteristic: uuid,
            reason: "no battery level data received".into(),
        })?;
        if level > 100 {
            return Err(BpError::InvalidBatteryLevel(level));
        }

        info!("Battery level: {}%", level);
        Ok(level)
    }
}
