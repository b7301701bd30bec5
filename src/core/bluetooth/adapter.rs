//! Platform seam for the BLE stack.
//! Everything the monitor needs from the host Bluetooth stack goes through
//! [`BleAdapter`]; the protocol logic never touches a platform type directly.

use std::fmt::Debug;
use std::pin::Pin;

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::error::BpResult;
use crate::core::bluetooth::types::{Advertisement, CharacteristicFlags};

/// Stream of advertisements produced by an active scan.
pub type AdvertisementStream<D> = Pin<Box<dyn Stream<Item = Advertisement<D>> + Send>>;

/// Receives every notification payload of one subscription, in arrival order.
pub type FrameSink = mpsc::UnboundedSender<Vec<u8>>;

#[async_trait::async_trait]
pub trait BleAdapter: Send + Sync + 'static {
    type Device: Clone + Debug + PartialEq + Send + Sync + 'static;
    type Service: Clone + Debug + Send + Sync + 'static;
    type Characteristic: Clone + Debug + Send + Sync + 'static;

    /// Checks that Bluetooth is powered and the process may use it.
    async fn ensure_ready(&self) -> BpResult<()>;

    /// Starts an active scan. Dropping the stream alone does not stop the radio; call `stop_scan`.
    async fn start_scan(&self) -> BpResult<AdvertisementStream<Self::Device>>;

    /// Stops the scan started by `start_scan`. Safe to call when no scan is running.
    async fn stop_scan(&self);

    async fn connect(&self, device: &Self::Device) -> BpResult<()>;

    async fn disconnect(&self, device: &Self::Device) -> BpResult<()>;

    async fn discover_services(
        &self,
        device: &Self::Device,
        uuid: Uuid,
    ) -> BpResult<Vec<Self::Service>>;

    async fn discover_characteristics(
        &self,
        service: &Self::Service,
        uuid: Uuid,
    ) -> BpResult<Vec<Self::Characteristic>>;

    async fn properties(&self, characteristic: &Self::Characteristic)
    -> BpResult<CharacteristicFlags>;

    async fn read(&self, characteristic: &Self::Characteristic) -> BpResult<Vec<u8>>;

    async fn write(&self, characteristic: &Self::Characteristic, value: &[u8]) -> BpResult<()>;

    /// Enables notifications and forwards each payload into `sink` until `cancel` fires
    /// or the receiving side is dropped.
    async fn subscribe(
        &self,
        characteristic: &Self::Characteristic,
        sink: FrameSink,
        cancel: CancellationToken,
    ) -> BpResult<()>;
}
