//! Bluetooth connection handling for the blood pressure monitor
//! This module owns the single device link: connecting, disconnecting and
//! publishing the current `ConnectionState`.

use std::sync::Arc;

use log::{info, warn};
use tokio::sync::watch;

use crate::core::bluetooth::adapter::BleAdapter;
use crate::core::bluetooth::error::{BpError, BpResult};
use crate::core::bluetooth::types::{ConnectionState, DeviceHandle, DeviceRef};

/// Connection manager for the monitor. Holds at most one live `DeviceHandle`.
pub struct ConnectionManager<A: BleAdapter> {
    adapter: Arc<A>,
    handle: Option<DeviceHandle<A>>,
    state: watch::Sender<ConnectionState>,
}

impl<A: BleAdapter> ConnectionManager<A> {
    pub fn new(adapter: Arc<A>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            adapter,
            handle: None,
            state,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            info!("Connection state: {:?} -> {:?}", previous, state);
        }
    }

    /// The live handle, if connected.
    pub fn handle(&self) -> Option<&DeviceHandle<A>> {
        self.handle.as_ref().filter(|h| h.is_live())
    }

    pub fn is_connected(&self) -> bool {
        self.handle().is_some()
    }

    /// Connects to whatever the locator found; `None` means the scan came up empty.
    pub async fn connect_located(
        &mut self,
        located: Option<DeviceRef<A::Device>>,
        name: &str,
    ) -> BpResult<DeviceHandle<A>> {
        let device = located.ok_or_else(|| BpError::DeviceNotFound(name.to_string()))?;
        self.connect(device).await
    }

    pub async fn connect(&mut self, device: DeviceRef<A::Device>) -> BpResult<DeviceHandle<A>> {
        if let Some(existing) = self.handle() {
            if existing.raw_device() == &device.device {
                info!("Device already connected.");
                return Ok(existing.clone());
            }
        }
        // Only one link at a time.
        self.disconnect().await?;

        let name = device.name.clone().unwrap_or_else(|| "Unknown".to_string());
        info!("Initiating connection to {}...", name);
        self.set_state(ConnectionState::Connecting);

        if let Err(e) = self.adapter.connect(&device.device).await {
            self.set_state(ConnectionState::Disconnected);
            return Err(match e {
                BpError::ConnectFailed(_) => e,
                other => BpError::ConnectFailed(other.to_string()),
            });
        }

        let handle = DeviceHandle::new(device.device, name);
        self.handle = Some(handle.clone());
        self.set_state(ConnectionState::Connected);
        info!("Connection successful");
        Ok(handle)
    }

    /// Releases every handle and subscription derived from the current link, then drops the link.
    /// Calling this while disconnected is a no-op.
    pub async fn disconnect(&mut self) -> BpResult<()> {
        let Some(handle) = self.handle.take() else {
            self.set_state(ConnectionState::Disconnected);
            return Ok(());
        };

        self.set_state(ConnectionState::Disconnecting);
        handle.release();
        let result = self.adapter.disconnect(handle.raw_device()).await;
        self.set_state(ConnectionState::Disconnected);

        match result {
            Ok(()) => {
                info!("Successfully disconnected from {}", handle.name());
                Ok(())
            }
            Err(e) => {
                warn!("Disconnecting from {} reported: {}", handle.name(), e);
                Err(e)
            }
        }
    }
}
