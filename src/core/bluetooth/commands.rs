//! Blood pressure feature commands
//! This module contains the commands written to the vendor feature characteristic

use std::sync::Arc;

use log::info;

use crate::core::bluetooth::adapter::BleAdapter;
use crate::core::bluetooth::constants::{FEATURE_CANCEL_READING, FEATURE_START_READING};
use crate::core::bluetooth::error::{BpError, BpResult};
use crate::core::bluetooth::types::CharacteristicHandle;

/// Feature characteristic commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureCommand {
    /// Inflate the cuff and take a reading (0x01F1)
    StartReading,
    /// Abort the reading and deflate (0x02F1)
    CancelReading,
}

impl FeatureCommand {
    pub fn value(&self) -> u16 {
        match self {
            Self::StartReading => FEATURE_START_READING,
            Self::CancelReading => FEATURE_CANCEL_READING,
        }
    }

    /// Convert the command to its little-endian wire form
    pub fn to_bytes(&self) -> [u8; 2] {
        self.value().to_le_bytes()
    }
}

/// Command sender trait
#[async_trait::async_trait]
pub trait CommandSender: Send + Sync {
    /// Send a command to the cuff
    async fn send_command(&self, command: FeatureCommand) -> BpResult<()>;
}

/// Writes feature commands through the BLE adapter
pub struct FeatureCommandSender<A: BleAdapter> {
    adapter: Arc<A>,
    feature: CharacteristicHandle<A>,
}

impl<A: BleAdapter> FeatureCommandSender<A> {
    pub fn new(adapter: Arc<A>, feature: CharacteristicHandle<A>) -> Self {
        Self { adapter, feature }
    }
}

#[async_trait::async_trait]
impl<A: BleAdapter> CommandSender for FeatureCommandSender<A> {
    async fn send_command(&self, command: FeatureCommand) -> BpResult<()> {
        let raw = self.feature.characteristic()?;
        if !self.feature.flags().writable {
            return Err(BpError::WriteFailed {
                characteristic: self.feature.uuid(),
                reason: "characteristic is not writable".into(),
            });
        }

        info!("Sending command to cuff: {:?}", command);
        self.adapter
            .write(raw, &command.to_bytes())
            .await
            .map_err(|e| match e {
                BpError::WriteFailed { .. } | BpError::NotConnected => e,
                other => BpError::WriteFailed {
                    characteristic: self.feature.uuid(),
                    reason: other.to_string(),
                },
            })
    }
}
