//! Monitor commands
//! This module defines the operations the runner invokes: a full measurement,
//! a battery check and an operator cancel.

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;

use crate::core::bluetooth::adapter::BleAdapter;
use crate::core::bluetooth::error::BpResult;
use crate::core::monitor::BloodPressureMonitor;
use crate::core::session::SessionOutcome;

/// One completed measurement, ready to be stored or printed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeasurementRecord {
    pub timestamp: DateTime<Utc>,
    pub systolic: u16,
    pub diastolic: u16,
    pub mean_arterial_pressure: u16,
    pub pulse_rate: u16,
    pub battery_percent: u8,
}

/// Reads the battery, takes one reading, then lets go of the cuff when configured to.
/// The reading slot is held from the start, so `cancel_measurement` also stops
/// a measurement that is still scanning, connecting or reading the battery.
///
/// # Returns
/// `None` when the reading was canceled before it completed.
pub async fn take_measurement<A: BleAdapter>(
    monitor: &BloodPressureMonitor<A>,
) -> BpResult<Option<MeasurementRecord>> {
    let result = measure(monitor).await;

    if monitor.config().disconnect_after_measurement {
        if let Err(e) = monitor.disconnect().await {
            warn!("Disconnect after measurement failed: {}", e);
        }
    }
    result
}

async fn measure<A: BleAdapter>(
    monitor: &BloodPressureMonitor<A>,
) -> BpResult<Option<MeasurementRecord>> {
    let claim = monitor.claim_reading()?;
    let battery_percent = monitor.read_battery().await?;

    match monitor.run_reading(claim).await? {
        SessionOutcome::Completed(reading) => Ok(Some(MeasurementRecord {
            timestamp: Utc::now(),
            systolic: reading.systolic,
            diastolic: reading.diastolic,
            mean_arterial_pressure: reading.mean_arterial_pressure,
            pulse_rate: reading.pulse_rate,
            battery_percent,
        })),
        SessionOutcome::Canceled => Ok(None),
    }
}

pub async fn read_battery_level<A: BleAdapter>(monitor: &BloodPressureMonitor<A>) -> BpResult<u8> {
    monitor.read_battery().await
}

/// Stops a running reading and drops the link.
///
/// # Returns
/// Whether a reading was actually canceled.
pub async fn cancel_measurement<A: BleAdapter>(monitor: &BloodPressureMonitor<A>) -> BpResult<bool> {
    let canceled = monitor.cancel_reading().await;
    monitor.disconnect().await?;
    let canceled = canceled?;
    if canceled {
        info!("Measurement canceled by operator");
    }
    Ok(canceled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::MonitorConfig;
    use crate::core::bluetooth::constants::BLOOD_PRESSURE_MEASUREMENT_ID;
    use crate::core::bluetooth::error::BpError;
    use crate::core::bluetooth::mock::MockAdapter;
    use crate::core::bluetooth::short_id::uuid_from_short_id;
    use crate::core::bluetooth::types::ConnectionState;
    use crate::core::session::SessionPhase;

    async fn wait_until_sent(monitor: &BloodPressureMonitor<MockAdapter>) {
        for _ in 0..1000 {
            if monitor
                .session_phase()
                .is_some_and(|p| p >= SessionPhase::CommandSent)
            {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("start command never sent");
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_measurement() {
        let mock = Arc::new(MockAdapter::qardio());
        let monitor = Arc::new(BloodPressureMonitor::new(mock.clone(), MonitorConfig::default()));

        let task = {
            let monitor = monitor.clone();
            tokio::spawn(async move { take_measurement(&*monitor).await })
        };
        wait_until_sent(&monitor).await;
        let measurement = uuid_from_short_id(BLOOD_PRESSURE_MEASUREMENT_ID);
        mock.notify(measurement, &[0x1E, 0x8C, 0x00]);
        mock.notify(measurement, &[0x1E, 0x7A, 0x00, 0x4F, 0x00, 0x5D, 0x00, 0x44, 0x00]);

        let record = task.await.unwrap().unwrap().unwrap();
        assert_eq!(
            (record.systolic, record.diastolic, record.mean_arterial_pressure, record.pulse_rate),
            (122, 79, 93, 68)
        );
        assert_eq!(record.battery_percent, 87);
        assert_eq!(mock.disconnects(), 1);
        assert_eq!(monitor.connection_state().await, ConnectionState::Disconnected);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["pulse_rate"], 68);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keeps_link_when_configured() {
        let mock = Arc::new(MockAdapter::qardio());
        let config = MonitorConfig {
            disconnect_after_measurement: false,
            ..Default::default()
        };
        let monitor = Arc::new(BloodPressureMonitor::new(mock.clone(), config));

        let task = {
            let monitor = monitor.clone();
            tokio::spawn(async move { take_measurement(&*monitor).await })
        };
        wait_until_sent(&monitor).await;
        mock.notify(
            uuid_from_short_id(BLOOD_PRESSURE_MEASUREMENT_ID),
            &[0x1E, 120, 0, 80, 0, 93, 0, 65, 0],
        );
        assert!(task.await.unwrap().unwrap().is_some());
        assert_eq!(mock.disconnects(), 0);
        assert_eq!(monitor.connection_state().await, ConnectionState::Ready);
    }

    #[tokio::test]
    async fn test_operator_cancel() {
        let mock = Arc::new(MockAdapter::qardio());
        let monitor = Arc::new(BloodPressureMonitor::new(mock.clone(), MonitorConfig::default()));

        let task = {
            let monitor = monitor.clone();
            tokio::spawn(async move { take_measurement(&*monitor).await })
        };
        wait_until_sent(&monitor).await;

        assert!(cancel_measurement(&*monitor).await.unwrap());
        assert_eq!(task.await.unwrap().unwrap(), None);
        let writes = mock.writes();
        assert_eq!(writes.last().map(|(_, v)| v.clone()), Some(vec![0xF1, 0x02]));
        assert_eq!(monitor.connection_state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_cancel_before_reading_starts_keeps_cuff_idle() {
        let mock = Arc::new(MockAdapter::qardio());
        mock.hold_reads();
        let monitor = Arc::new(BloodPressureMonitor::new(mock.clone(), MonitorConfig::default()));

        let task = {
            let monitor = monitor.clone();
            tokio::spawn(async move { take_measurement(&*monitor).await })
        };
        while !monitor.is_reading() {
            tokio::task::yield_now().await;
        }
        assert_eq!(monitor.session_phase(), Some(SessionPhase::Idle));

        // Ctrl-C while the battery read is still outstanding
        let canceler = {
            let monitor = monitor.clone();
            tokio::spawn(async move { cancel_measurement(&*monitor).await })
        };
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        mock.release_reads();

        assert!(canceler.await.unwrap().unwrap());
        assert_eq!(task.await.unwrap().unwrap(), None);
        assert!(mock.writes().is_empty());
        assert_eq!(monitor.connection_state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_battery_failure_skips_the_reading() {
        let mock = MockAdapter::qardio();
        mock.set_battery(None);
        let mock = Arc::new(mock);
        let monitor = BloodPressureMonitor::new(mock.clone(), MonitorConfig::default());

        let err = take_measurement(&monitor).await.unwrap_err();
        assert!(matches!(err, BpError::ReadFailed { .. }));
        assert!(mock.writes().is_empty());
        assert_eq!(mock.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_read_battery_level() {
        let mock = Arc::new(MockAdapter::qardio());
        let monitor = BloodPressureMonitor::new(mock, MonitorConfig::default());
        assert_eq!(read_battery_level(&monitor).await.unwrap(), 87);
    }
}
