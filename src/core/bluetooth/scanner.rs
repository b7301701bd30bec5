//! Device discovery for the blood pressure monitor

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use log::{debug, info, warn};

use crate::core::bluetooth::adapter::BleAdapter;
use crate::core::bluetooth::error::BpResult;
use crate::core::bluetooth::types::DeviceRef;

pub struct DeviceLocator<A: BleAdapter> {
    adapter: Arc<A>,
}

impl<A: BleAdapter> DeviceLocator<A> {
    pub fn new(adapter: Arc<A>) -> Self {
        Self { adapter }
    }

    /// Scans until a device advertising exactly `name_filter` shows up, or `timeout` elapses.
    /// The scan is stopped on every path out of this function.
    pub async fn scan(
        &self,
        name_filter: &str,
        timeout: Duration,
    ) -> BpResult<Option<DeviceRef<A::Device>>> {
        info!(
            "Starting bluetooth scan for '{}' ({} ms)",
            name_filter,
            timeout.as_millis()
        );
        let found = match self.adapter.start_scan().await {
            Ok(mut scan_stream) => {
                let first_match = async {
                    while let Some(advertisement) = scan_stream.next().await {
                        debug!(
                            "Found device - Name: {:?}, RSSI: {:?}",
                            advertisement.name, advertisement.rssi
                        );
                        if advertisement.name.as_deref() == Some(name_filter) {
                            return Some(advertisement);
                        }
                    }
                    info!("Bluetooth scan stream has ended.");
                    None
                };
                Ok(tokio::time::timeout(timeout, first_match)
                    .await
                    .unwrap_or(None))
            }
            Err(e) => {
                warn!("Failed to start scan: {}", e);
                Err(e)
            }
        };

        self.adapter.stop_scan().await;

        let found = found?;
        match &found {
            Some(device) => info!("Found '{}' (RSSI: {:?})", name_filter, device.rssi),
            None => info!("No device named '{}' found", name_filter),
        }
        Ok(found)
    }
}
