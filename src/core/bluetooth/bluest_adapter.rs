//! `BleAdapter` backed by the host Bluetooth stack through bluest.

use std::sync::Mutex;

use bluest::error::ErrorKind;
use bluest::{Adapter, Characteristic, Device, Service};
use futures_util::{StreamExt, stream};
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::adapter::{AdvertisementStream, BleAdapter, FrameSink};
use crate::core::bluetooth::error::{BpError, BpResult};
use crate::core::bluetooth::types::{Advertisement, CharacteristicFlags};

pub struct BluestAdapter {
    adapter: Adapter,
    /// Cancels the forwarding task of the running scan
    scan_cancel: Mutex<Option<CancellationToken>>,
}

impl BluestAdapter {
    /// Opens the default adapter of the host.
    pub async fn new() -> BpResult<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| BpError::AdapterUnavailable("No Bluetooth adapter found".into()))?;
        info!("Bluetooth adapter opened.");
        Ok(Self {
            adapter,
            scan_cancel: Mutex::new(None),
        })
    }

    fn replace_scan_token(&self, token: Option<CancellationToken>) -> Option<CancellationToken> {
        let mut slot = match self.scan_cancel.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *slot, token)
    }
}

fn is_not_authorized(e: &bluest::Error) -> bool {
    matches!(e.kind(), ErrorKind::NotAuthorized)
}

#[async_trait::async_trait]
impl BleAdapter for BluestAdapter {
    type Device = Device;
    type Service = Service;
    type Characteristic = Characteristic;

    async fn ensure_ready(&self) -> BpResult<()> {
        match self.adapter.is_available().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(BpError::AdapterUnavailable(
                "Bluetooth is not enabled".into(),
            )),
            Err(e) if is_not_authorized(&e) => Err(BpError::PermissionDenied),
            Err(e) => Err(e.into()),
        }
    }

    async fn start_scan(&self) -> BpResult<AdvertisementStream<Device>> {
        let cancel = CancellationToken::new();
        if let Some(previous) = self.replace_scan_token(Some(cancel.clone())) {
            previous.cancel();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let (started_tx, started_rx) = oneshot::channel::<BpResult<()>>();
        let adapter = self.adapter.clone();

        tokio::spawn(async move {
            let mut scan_stream = match adapter.scan(&[]).await {
                Ok(scan_stream) => {
                    let _ = started_tx.send(Ok(()));
                    scan_stream
                }
                Err(e) => {
                    error!("Failed to start Bluetooth scan: {}", e);
                    let error = if is_not_authorized(&e) {
                        BpError::PermissionDenied
                    } else {
                        e.into()
                    };
                    let _ = started_tx.send(Err(error));
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    discovered = scan_stream.next() => match discovered {
                        Some(discovered) => {
                            debug!(
                                "Found device - Device: {:?}, RSSI: {:?}",
                                discovered.device, discovered.rssi
                            );
                            let name = discovered
                                .adv_data
                                .local_name
                                .or_else(|| discovered.device.name().ok());
                            let advertisement = Advertisement {
                                device: discovered.device,
                                name,
                                rssi: discovered.rssi,
                            };
                            if tx.send(advertisement).is_err() {
                                break;
                            }
                        }
                        None => {
                            info!("Bluetooth scan stream has ended.");
                            break;
                        }
                    },
                }
            }
            debug!("Scan forwarding task finished");
        });

        match started_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(BpError::AdapterUnavailable(
                    "scan task exited before starting".into(),
                ));
            }
        }

        info!("Bluetooth scan started.");
        let advertisements = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|advertisement| (advertisement, rx))
        });
        Ok(Box::pin(advertisements))
    }

    async fn stop_scan(&self) {
        if let Some(cancel) = self.replace_scan_token(None) {
            info!("Stopping Bluetooth scan.");
            cancel.cancel();
        }
    }

    async fn connect(&self, device: &Device) -> BpResult<()> {
        if device.is_connected().await {
            return Ok(());
        }
        self.adapter
            .connect_device(device)
            .await
            .map_err(|e| BpError::ConnectFailed(e.to_string()))
    }

    async fn disconnect(&self, device: &Device) -> BpResult<()> {
        if !device.is_connected().await {
            info!("Device {} not connected", device.id());
            return Ok(());
        }
        info!("Disconnecting from device {}", device.id());
        self.adapter.disconnect_device(device).await?;
        Ok(())
    }

    async fn discover_services(&self, device: &Device, uuid: Uuid) -> BpResult<Vec<Service>> {
        let services = device.discover_services_with_uuid(uuid).await.map_err(|e| {
            if matches!(e.kind(), ErrorKind::NotConnected) {
                BpError::NotConnected
            } else {
                e.into()
            }
        })?;
        Ok(services)
    }

    async fn discover_characteristics(
        &self,
        service: &Service,
        uuid: Uuid,
    ) -> BpResult<Vec<Characteristic>> {
        Ok(service.discover_characteristics_with_uuid(uuid).await?)
    }

    async fn properties(&self, characteristic: &Characteristic) -> BpResult<CharacteristicFlags> {
        let props = characteristic.properties().await?;
        Ok(CharacteristicFlags {
            readable: props.read,
            writable: props.write || props.write_without_response,
            notifiable: props.notify || props.indicate,
        })
    }

    async fn read(&self, characteristic: &Characteristic) -> BpResult<Vec<u8>> {
        characteristic
            .read()
            .await
            .map_err(|e| BpError::ReadFailed {
                characteristic: characteristic.uuid(),
                reason: e.to_string(),
            })
    }

    async fn write(&self, characteristic: &Characteristic, value: &[u8]) -> BpResult<()> {
        characteristic
            .write(value)
            .await
            .map_err(|e| BpError::WriteFailed {
                characteristic: characteristic.uuid(),
                reason: e.to_string(),
            })
    }

    async fn subscribe(
        &self,
        characteristic: &Characteristic,
        sink: FrameSink,
        cancel: CancellationToken,
    ) -> BpResult<()> {
        let characteristic = characteristic.clone();
        let uuid = characteristic.uuid();
        let (started_tx, started_rx) = oneshot::channel::<BpResult<()>>();

        tokio::spawn(async move {
            let mut notifications = match characteristic.notify().await {
                Ok(notifications) => {
                    let _ = started_tx.send(Ok(()));
                    notifications
                }
                Err(e) => {
                    error!("Failed to subscribe to notifications: {}", e);
                    let _ = started_tx.send(Err(BpError::WriteFailed {
                        characteristic: uuid,
                        reason: e.to_string(),
                    }));
                    return;
                }
            };

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    value = notifications.next() => match value {
                        Some(Ok(value)) => {
                            if sink.send(value).is_err() {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            warn!("Error in notification stream: {}", e);
                            break;
                        }
                        None => break,
                    },
                }
            }
            // Dropping the stream disables notifications on the peripheral.
            debug!("Stopped listening for notifications on {}", uuid);
        });

        started_rx.await.unwrap_or_else(|_| {
            Err(BpError::WriteFailed {
                characteristic: uuid,
                reason: "notification task exited before subscribing".into(),
            })
        })
    }
}
