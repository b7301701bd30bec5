//! Defines shared data structures for the Bluetooth module.

use std::fmt;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::adapter::BleAdapter;
use crate::core::bluetooth::error::{BpError, BpResult};

/// A device seen while scanning
#[derive(Debug, Clone)]
pub struct Advertisement<D> {
    /// Platform device reference
    pub device: D,
    /// The advertised local name, if any
    pub name: Option<String>,
    /// The signal strength (RSSI) of the advertisement
    pub rssi: Option<i16>,
}

/// The device picked by the locator
pub type DeviceRef<D> = Advertisement<D>;

/// What a characteristic allows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CharacteristicFlags {
    pub readable: bool,
    pub writable: bool,
    pub notifiable: bool,
}

/// Link state of the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Resolving,
    Ready,
    ReadingInProgress,
    Disconnecting,
}

/// A connected device. Every handle derived from it shares its link token,
/// which is cancelled on disconnect.
pub struct DeviceHandle<A: BleAdapter> {
    device: A::Device,
    name: String,
    link: CancellationToken,
}

impl<A: BleAdapter> DeviceHandle<A> {
    pub(crate) fn new(device: A::Device, name: String) -> Self {
        Self {
            device,
            name,
            link: CancellationToken::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_live(&self) -> bool {
        !self.link.is_cancelled()
    }

    pub(crate) fn device(&self) -> BpResult<&A::Device> {
        ensure_live(&self.link)?;
        Ok(&self.device)
    }

    pub(crate) fn raw_device(&self) -> &A::Device {
        &self.device
    }

    pub(crate) fn link(&self) -> &CancellationToken {
        &self.link
    }

    /// Invalidates this handle and everything resolved through it.
    pub(crate) fn release(&self) {
        self.link.cancel();
    }
}

impl<A: BleAdapter> Clone for DeviceHandle<A> {
    fn clone(&self) -> Self {
        Self {
            device: self.device.clone(),
            name: self.name.clone(),
            link: self.link.clone(),
        }
    }
}

impl<A: BleAdapter> fmt::Debug for DeviceHandle<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("name", &self.name)
            .field("live", &self.is_live())
            .finish()
    }
}

/// A resolved service, valid while its device stays connected
pub struct ServiceHandle<A: BleAdapter> {
    service: A::Service,
    uuid: Uuid,
    link: CancellationToken,
}

impl<A: BleAdapter> ServiceHandle<A> {
    pub(crate) fn new(service: A::Service, uuid: Uuid, link: CancellationToken) -> Self {
        Self { service, uuid, link }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn is_live(&self) -> bool {
        !self.link.is_cancelled()
    }

    pub(crate) fn service(&self) -> BpResult<&A::Service> {
        ensure_live(&self.link)?;
        Ok(&self.service)
    }

    pub(crate) fn link(&self) -> &CancellationToken {
        &self.link
    }
}

impl<A: BleAdapter> Clone for ServiceHandle<A> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            uuid: self.uuid,
            link: self.link.clone(),
        }
    }
}

impl<A: BleAdapter> fmt::Debug for ServiceHandle<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("uuid", &self.uuid)
            .field("live", &self.is_live())
            .finish()
    }
}

/// A resolved characteristic with the capability flags queried at resolution time
pub struct CharacteristicHandle<A: BleAdapter> {
    characteristic: A::Characteristic,
    uuid: Uuid,
    service_uuid: Uuid,
    flags: CharacteristicFlags,
    link: CancellationToken,
}

impl<A: BleAdapter> CharacteristicHandle<A> {
    pub(crate) fn new(
        characteristic: A::Characteristic,
        uuid: Uuid,
        service_uuid: Uuid,
        flags: CharacteristicFlags,
        link: CancellationToken,
    ) -> Self {
        Self {
            characteristic,
            uuid,
            service_uuid,
            flags,
            link,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn service_uuid(&self) -> Uuid {
        self.service_uuid
    }

    pub fn flags(&self) -> CharacteristicFlags {
        self.flags
    }

    pub fn is_live(&self) -> bool {
        !self.link.is_cancelled()
    }

    pub(crate) fn characteristic(&self) -> BpResult<&A::Characteristic> {
        ensure_live(&self.link)?;
        Ok(&self.characteristic)
    }

    pub(crate) fn link(&self) -> &CancellationToken {
        &self.link
    }
}

impl<A: BleAdapter> Clone for CharacteristicHandle<A> {
    fn clone(&self) -> Self {
        Self {
            characteristic: self.characteristic.clone(),
            uuid: self.uuid,
            service_uuid: self.service_uuid,
            flags: self.flags,
            link: self.link.clone(),
        }
    }
}

impl<A: BleAdapter> fmt::Debug for CharacteristicHandle<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CharacteristicHandle")
            .field("uuid", &self.uuid)
            .field("service", &self.service_uuid)
            .field("flags", &self.flags)
            .field("live", &self.is_live())
            .finish()
    }
}

fn ensure_live(link: &CancellationToken) -> BpResult<()> {
    if link.is_cancelled() {
        Err(BpError::NotConnected)
    } else {
        Ok(())
    }
}
