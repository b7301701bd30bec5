//! In-memory `BleAdapter` for tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::{StreamExt, stream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::adapter::{AdvertisementStream, BleAdapter, FrameSink};
use crate::core::bluetooth::constants::{
    BATTERY_SERVICE_ID, BLOOD_PRESSURE_MEASUREMENT_ID, BLOOD_PRESSURE_SERVICE_ID, DEVICE_NAME,
    UUID_BATTERY_LEVEL, UUID_BLOOD_PRESSURE_FEATURE,
};
use crate::core::bluetooth::error::{BpError, BpResult};
use crate::core::bluetooth::short_id::uuid_from_short_id;
use crate::core::bluetooth::types::{Advertisement, CharacteristicFlags};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockDevice {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct MockService {
    pub uuid: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCharacteristic {
    pub uuid: Uuid,
    pub index: usize,
}

#[derive(Debug, Clone)]
struct MockServiceDef {
    uuid: Uuid,
    characteristics: Vec<(Uuid, CharacteristicFlags)>,
}

struct MockSubscription {
    uuid: Uuid,
    sink: FrameSink,
    cancel: CancellationToken,
}

#[derive(Default)]
struct MockState {
    advertisements: Vec<(Duration, Option<String>)>,
    services: Vec<MockServiceDef>,
    permission_denied: bool,
    connect_fails: bool,
    battery_payload: Option<Vec<u8>>,
    failing_writes: HashSet<Vec<u8>>,
    scans_started: usize,
    scans_stopped: usize,
    connects: usize,
    disconnects: usize,
    writes: Vec<(Uuid, Vec<u8>)>,
    subscriptions: Vec<MockSubscription>,
}

pub struct MockAdapter {
    state: Mutex<MockState>,
    write_gate: Mutex<Option<Arc<Semaphore>>>,
    read_gate: Mutex<Option<Arc<Semaphore>>>,
}

pub const READ: CharacteristicFlags = CharacteristicFlags {
    readable: true,
    writable: false,
    notifiable: false,
};

pub const WRITE: CharacteristicFlags = CharacteristicFlags {
    readable: false,
    writable: true,
    notifiable: false,
};

pub const NOTIFY: CharacteristicFlags = CharacteristicFlags {
    readable: false,
    writable: false,
    notifiable: true,
};

impl MockAdapter {
    pub fn empty() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            write_gate: Mutex::new(None),
            read_gate: Mutex::new(None),
        }
    }

    /// A QardioARM advertising immediately, with its battery and blood pressure services.
    pub fn qardio() -> Self {
        let mock = Self::empty();
        mock.advertise(Duration::ZERO, Some(DEVICE_NAME));
        mock.add_service(
            uuid_from_short_id(BATTERY_SERVICE_ID),
            vec![(UUID_BATTERY_LEVEL, READ)],
        );
        mock.add_service(
            uuid_from_short_id(BLOOD_PRESSURE_SERVICE_ID),
            vec![
                (uuid_from_short_id(BLOOD_PRESSURE_MEASUREMENT_ID), NOTIFY),
                (UUID_BLOOD_PRESSURE_FEATURE, WRITE),
            ],
        );
        mock.set_battery(Some(vec![87]));
        mock
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn advertise(&self, delay: Duration, name: Option<&str>) {
        self.lock()
            .advertisements
            .push((delay, name.map(str::to_string)));
    }

    pub fn add_service(&self, uuid: Uuid, characteristics: Vec<(Uuid, CharacteristicFlags)>) {
        self.lock().services.push(MockServiceDef {
            uuid,
            characteristics,
        });
    }

    pub fn deny_permission(&self) {
        self.lock().permission_denied = true;
    }

    pub fn fail_connect(&self) {
        self.lock().connect_fails = true;
    }

    pub fn set_battery(&self, payload: Option<Vec<u8>>) {
        self.lock().battery_payload = payload;
    }

    pub fn fail_write_of(&self, value: &[u8]) {
        self.lock().failing_writes.insert(value.to_vec());
    }

    /// Makes every write wait until `release_writes` is called.
    pub fn hold_writes(&self) {
        *self.write_gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_writes(&self) {
        if let Some(gate) = self.write_gate.lock().unwrap().as_ref() {
            gate.add_permits(1024);
        }
    }

    /// Makes every read wait until `release_reads` is called.
    pub fn hold_reads(&self) {
        *self.read_gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_reads(&self) {
        if let Some(gate) = self.read_gate.lock().unwrap().as_ref() {
            gate.add_permits(1024);
        }
    }

    /// Pushes a notification to every live subscription on `uuid`, returning how many received it.
    pub fn notify(&self, uuid: Uuid, frame: &[u8]) -> usize {
        self.lock()
            .subscriptions
            .iter()
            .filter(|s| s.uuid == uuid && !s.cancel.is_cancelled())
            .filter(|s| s.sink.send(frame.to_vec()).is_ok())
            .count()
    }

    /// Drops every sink registered on `uuid`, as a platform stream error would.
    pub fn end_notifications(&self, uuid: Uuid) {
        self.lock().subscriptions.retain(|s| s.uuid != uuid);
    }

    pub fn active_subscriptions(&self, uuid: Uuid) -> usize {
        self.lock()
            .subscriptions
            .iter()
            .filter(|s| s.uuid == uuid && !s.cancel.is_cancelled() && !s.sink.is_closed())
            .count()
    }

    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.lock().writes.clone()
    }

    pub fn scans(&self) -> (usize, usize) {
        let state = self.lock();
        (state.scans_started, state.scans_stopped)
    }

    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn disconnects(&self) -> usize {
        self.lock().disconnects
    }
}

#[async_trait::async_trait]
impl BleAdapter for MockAdapter {
    type Device = MockDevice;
    type Service = MockService;
    type Characteristic = MockCharacteristic;

    async fn ensure_ready(&self) -> BpResult<()> {
        if self.lock().permission_denied {
            return Err(BpError::PermissionDenied);
        }
        Ok(())
    }

    async fn start_scan(&self) -> BpResult<AdvertisementStream<MockDevice>> {
        let advertisements = {
            let mut state = self.lock();
            state.scans_started += 1;
            state.advertisements.clone()
        };
        let stream = stream::iter(advertisements)
            .then(|(delay, name)| async move {
                tokio::time::sleep(delay).await;
                Advertisement {
                    device: MockDevice {
                        name: name.clone().unwrap_or_default(),
                    },
                    name,
                    rssi: Some(-60),
                }
            })
            .chain(stream::pending());
        Ok(Box::pin(stream))
    }

    async fn stop_scan(&self) {
        self.lock().scans_stopped += 1;
    }

    async fn connect(&self, _device: &MockDevice) -> BpResult<()> {
        let mut state = self.lock();
        if state.connect_fails {
            return Err(BpError::ConnectFailed("link refused".into()));
        }
        state.connects += 1;
        Ok(())
    }

    async fn disconnect(&self, _device: &MockDevice) -> BpResult<()> {
        self.lock().disconnects += 1;
        Ok(())
    }

    async fn discover_services(
        &self,
        _device: &MockDevice,
        uuid: Uuid,
    ) -> BpResult<Vec<MockService>> {
        Ok(self
            .lock()
            .services
            .iter()
            .filter(|s| s.uuid == uuid)
            .map(|s| MockService { uuid: s.uuid })
            .collect())
    }

    async fn discover_characteristics(
        &self,
        service: &MockService,
        uuid: Uuid,
    ) -> BpResult<Vec<MockCharacteristic>> {
        let state = self.lock();
        let Some(def) = state.services.iter().find(|s| s.uuid == service.uuid) else {
            return Ok(Vec::new());
        };
        Ok(def
            .characteristics
            .iter()
            .enumerate()
            .filter(|(_, (c, _))| *c == uuid)
            .map(|(index, (c, _))| MockCharacteristic { uuid: *c, index })
            .collect())
    }

    async fn properties(&self, characteristic: &MockCharacteristic) -> BpResult<CharacteristicFlags> {
        self.lock()
            .services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .find(|(uuid, _)| *uuid == characteristic.uuid)
            .map(|(_, flags)| *flags)
            .ok_or(BpError::NotConnected)
    }

    async fn read(&self, characteristic: &MockCharacteristic) -> BpResult<Vec<u8>> {
        let gate = self.read_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await.map_err(|_| BpError::NotConnected)?;
        }
        self.lock()
            .battery_payload
            .clone()
            .ok_or_else(|| BpError::ReadFailed {
                characteristic: characteristic.uuid,
                reason: "unreachable".into(),
            })
    }

    async fn write(&self, characteristic: &MockCharacteristic, value: &[u8]) -> BpResult<()> {
        let gate = self.write_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await.map_err(|_| BpError::NotConnected)?;
        }
        let mut state = self.lock();
        state.writes.push((characteristic.uuid, value.to_vec()));
        if state.failing_writes.contains(value) {
            return Err(BpError::WriteFailed {
                characteristic: characteristic.uuid,
                reason: "unreachable".into(),
            });
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        characteristic: &MockCharacteristic,
        sink: FrameSink,
        cancel: CancellationToken,
    ) -> BpResult<()> {
        self.lock().subscriptions.push(MockSubscription {
            uuid: characteristic.uuid,
            sink,
            cancel,
        });
        Ok(())
    }
}
