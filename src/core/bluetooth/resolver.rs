//! Service and characteristic lookup on a connected device.

use std::sync::Arc;

use log::{debug, error, info};

use crate::core::bluetooth::adapter::BleAdapter;
use crate::core::bluetooth::error::{BpError, BpResult};
use crate::core::bluetooth::short_id::GattId;
use crate::core::bluetooth::types::{CharacteristicHandle, DeviceHandle, ServiceHandle};

pub struct GattResolver<A: BleAdapter> {
    adapter: Arc<A>,
}

impl<A: BleAdapter> GattResolver<A> {
    pub fn new(adapter: Arc<A>) -> Self {
        Self { adapter }
    }

    /// Finds a service by short ID or UUID. When the device exposes the same
    /// service more than once, the first instance is used.
    pub async fn resolve_service(
        &self,
        device: &DeviceHandle<A>,
        id: impl Into<GattId>,
    ) -> BpResult<ServiceHandle<A>> {
        let uuid = id.into().uuid();
        let services = self
            .adapter
            .discover_services(device.device()?, uuid)
            .await?;
        let service = services.into_iter().next().ok_or_else(|| {
            error!("Service not found: {}", uuid);
            BpError::ServiceNotFound(uuid)
        })?;

        info!("Found service: {}", uuid);
        Ok(ServiceHandle::new(service, uuid, device.link().clone()))
    }

    /// Finds exactly one characteristic inside `service` and captures its capability flags.
    pub async fn resolve_characteristic(
        &self,
        service: &ServiceHandle<A>,
        id: impl Into<GattId>,
    ) -> BpResult<CharacteristicHandle<A>> {
        let uuid = id.into().uuid();
        let mut characteristics = self
            .adapter
            .discover_characteristics(service.service()?, uuid)
            .await?;

        let characteristic = match characteristics.len() {
            0 => {
                return Err(BpError::CharacteristicNotFound {
                    service: service.uuid(),
                    characteristic: uuid,
                });
            }
            1 => characteristics.remove(0),
            count => {
                return Err(BpError::AmbiguousMatch {
                    service: service.uuid(),
                    characteristic: uuid,
                    count,
                });
            }
        };

        let flags = self.adapter.properties(&characteristic).await?;
        debug!("Characteristic {} flags: {:?}", uuid, flags);
        info!("Found characteristic: {}", uuid);
        Ok(CharacteristicHandle::new(
            characteristic,
            uuid,
            service.uuid(),
            flags,
            service.link().clone(),
        ))
    }
}
