//! Blood pressure monitor
//! This module provides the main interface for talking to one cuff: it owns
//! the link, the resolved GATT profile and the single-session guard.

use std::sync::{Arc, Mutex as StdMutex};
use log::{error, info, warn};
use tokio::sync::{Mutex, watch};

use crate::config::MonitorConfig;
use crate::core::bluetooth::adapter::BleAdapter;
use crate::core::bluetooth::battery::BatteryReader;
use crate::core::bluetooth::connection::ConnectionManager;
use crate::core::bluetooth::constants::{
    BATTERY_SERVICE_ID, BLOOD_PRESSURE_MEASUREMENT_ID, BLOOD_PRESSURE_SERVICE_ID,
    UUID_BATTERY_LEVEL, UUID_BLOOD_PRESSURE_FEATURE,
};
use crate::core::bluetooth::error::{BpError, BpResult};
use crate::core::bluetooth::resolver::GattResolver;
use crate::core::bluetooth::scanner::DeviceLocator;
use crate::core::bluetooth::types::{CharacteristicHandle, ConnectionState, DeviceHandle};
use crate::core::session::{PendingSession, SessionControl, SessionOutcome, SessionPhase};

/// Characteristics the monitor needs, resolved once per connection
struct GattProfile<A: BleAdapter> {
    battery_level: CharacteristicHandle<A>,
    measurement: CharacteristicHandle<A>,
    feature: CharacteristicHandle<A>,
}

impl<A: BleAdapter> GattProfile<A> {
    fn is_live(&self) -> bool {
        self.battery_level.is_live() && self.measurement.is_live() && self.feature.is_live()
    }
}

impl<A: BleAdapter> Clone for GattProfile<A> {
    fn clone(&self) -> Self {
        Self {
            battery_level: self.battery_level.clone(),
            measurement: self.measurement.clone(),
            feature: self.feature.clone(),
        }
    }
}

struct MonitorLink<A: BleAdapter> {
    connection: ConnectionManager<A>,
    profile: Option<GattProfile<A>>,
}

/// Clears the active-session slot when the session ends, however it ends.
struct ActiveSessionGuard<'a> {
    slot: &'a StdMutex<Option<SessionControl>>,
}

impl Drop for ActiveSessionGuard<'_> {
    fn drop(&mut self) {
        match self.slot.lock() {
            Ok(mut slot) => *slot = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}

/// A reading slot taken ahead of time. A cancel issued while it is held,
/// before the reading starts, stops the reading from ever reaching the cuff.
pub struct ReadingClaim<'a> {
    pending: PendingSession,
    _guard: ActiveSessionGuard<'a>,
}

impl ReadingClaim<'_> {
    pub fn control(&self) -> SessionControl {
        self.pending.control()
    }
}

pub struct BloodPressureMonitor<A: BleAdapter> {
    adapter: Arc<A>,
    config: MonitorConfig,
    link: Mutex<MonitorLink<A>>,
    active_session: StdMutex<Option<SessionControl>>,
}

impl<A: BleAdapter> BloodPressureMonitor<A> {
    pub fn new(adapter: Arc<A>, config: MonitorConfig) -> Self {
        Self {
            link: Mutex::new(MonitorLink {
                connection: ConnectionManager::new(adapter.clone()),
                profile: None,
            }),
            adapter,
            config,
            active_session: StdMutex::new(None),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.link.lock().await.connection.state()
    }

    pub async fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.link.lock().await.connection.watch_state()
    }

    /// Phase of the running session, if any.
    pub fn session_phase(&self) -> Option<SessionPhase> {
        self.current_session().map(|control| control.phase())
    }

    pub fn is_reading(&self) -> bool {
        self.current_session().is_some()
    }

    /// Locates, connects and resolves the cuff's services. No-op when already ready.
    pub async fn connect(&self) -> BpResult<()> {
        let mut link = self.link.lock().await;
        self.ensure_connected(&mut link).await.map(|_| ())
    }

    /// Drops the link; every handle and subscription obtained through it is released.
    pub async fn disconnect(&self) -> BpResult<()> {
        let mut link = self.link.lock().await;
        link.profile = None;
        link.connection.disconnect().await
    }

    /// Reads the battery percentage, connecting first if needed.
    pub async fn read_battery(&self) -> BpResult<u8> {
        let mut link = self.link.lock().await;
        let profile = self.ensure_connected(&mut link).await?;
        BatteryReader::new(self.adapter.clone())
            .read_battery(&profile.battery_level)
            .await
    }

    /// Takes one blood pressure reading, connecting first if needed.
    /// Fails with `SessionAlreadyActive` while another reading is in flight.
    pub async fn read_blood_pressure(&self) -> BpResult<SessionOutcome> {
        let claim = self.claim_reading()?;
        self.run_reading(claim).await
    }

    /// Reserves the single reading slot without starting anything.
    /// Fails with `SessionAlreadyActive` while another claim is held.
    pub fn claim_reading(&self) -> BpResult<ReadingClaim<'_>> {
        let pending = PendingSession::new();
        let guard = self.claim_session(pending.control())?;
        Ok(ReadingClaim {
            pending,
            _guard: guard,
        })
    }

    /// Runs the reading reserved by `claim`, connecting first if needed.
    pub async fn run_reading(&self, claim: ReadingClaim<'_>) -> BpResult<SessionOutcome> {
        let ReadingClaim {
            mut pending,
            _guard,
        } = claim;
        if pending.acknowledge_early_cancel() {
            return Ok(SessionOutcome::Canceled);
        }

        let profile = {
            let mut link = self.link.lock().await;
            let profile = self.ensure_connected(&mut link).await?;
            // the cancel may have landed while connecting
            if pending.acknowledge_early_cancel() {
                return Ok(SessionOutcome::Canceled);
            }
            link.connection.set_state(ConnectionState::ReadingInProgress);
            profile
        };

        let result = pending
            .start(
                self.adapter.clone(),
                profile.measurement,
                profile.feature,
                self.config.session_timing(),
            )
            .run()
            .await;

        let link = self.link.lock().await;
        if link.connection.is_connected() {
            link.connection.set_state(ConnectionState::Ready);
        }
        match &result {
            Ok(SessionOutcome::Completed(reading)) => info!("Blood pressure reading: {}", reading),
            Ok(SessionOutcome::Canceled) => info!("Blood pressure reading canceled"),
            Err(e) => error!("Blood pressure reading failed: {}", e),
        }
        result
    }

    /// Cancels the running reading. Returns `Ok(false)` when there was nothing to cancel.
    pub async fn cancel_reading(&self) -> BpResult<bool> {
        match self.current_session() {
            Some(control) => control.cancel().await,
            None => {
                info!("No reading in progress to cancel");
                Ok(false)
            }
        }
    }

    fn current_session(&self) -> Option<SessionControl> {
        match self.active_session.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn claim_session(&self, control: SessionControl) -> BpResult<ActiveSessionGuard<'_>> {
        let mut slot = match self.active_session.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.is_some() {
            warn!("Rejecting reading request: one is already in progress");
            return Err(BpError::SessionAlreadyActive);
        }
        *slot = Some(control);
        Ok(ActiveSessionGuard {
            slot: &self.active_session,
        })
    }

    async fn ensure_connected(&self, link: &mut MonitorLink<A>) -> BpResult<GattProfile<A>> {
        if let Some(profile) = link.profile.as_ref().filter(|p| p.is_live()) {
            return Ok(profile.clone());
        }
        link.profile = None;

        self.adapter.ensure_ready().await?;
        let device = match link.connection.handle() {
            Some(device) => device.clone(),
            None => {
                let located = DeviceLocator::new(self.adapter.clone())
                    .scan(&self.config.device_name, self.config.scan_timeout())
                    .await?;
                link.connection
                    .connect_located(located, &self.config.device_name)
                    .await?
            }
        };

        link.connection.set_state(ConnectionState::Resolving);
        match self.resolve_profile(&device).await {
            Ok(profile) => {
                link.connection.set_state(ConnectionState::Ready);
                link.profile = Some(profile.clone());
                Ok(profile)
            }
            Err(e) => {
                error!("Failed to resolve monitor services: {}", e);
                if let Err(disconnect_error) = link.connection.disconnect().await {
                    warn!("Cleanup disconnect failed: {}", disconnect_error);
                }
                Err(e)
            }
        }
    }

    async fn resolve_profile(&self, device: &DeviceHandle<A>) -> BpResult<GattProfile<A>> {
        let resolver = GattResolver::new(self.adapter.clone());

        let battery_service = resolver.resolve_service(device, BATTERY_SERVICE_ID).await?;
        let battery_level = resolver
            .resolve_characteristic(&battery_service, UUID_BATTERY_LEVEL)
            .await?;

        let bp_service = resolver
            .resolve_service(device, BLOOD_PRESSURE_SERVICE_ID)
            .await?;
        let measurement = resolver
            .resolve_characteristic(&bp_service, BLOOD_PRESSURE_MEASUREMENT_ID)
            .await?;
        let feature = resolver
            .resolve_characteristic(&bp_service, UUID_BLOOD_PRESSURE_FEATURE)
            .await?;

        Ok(GattProfile {
            battery_level,
            measurement,
            feature,
        })
    }
}
