//! QardioARM blood pressure monitor library
//! This is the main library for the bpmon runner: BLE plumbing, the reading
//! session state machine and the measurement commands built on top of them.

// Module declarations
pub mod commands;
pub mod config;
pub mod core;
pub mod logging;
pub mod utils;

pub use commands::{MeasurementRecord, cancel_measurement, read_battery_level, take_measurement};
pub use config::MonitorConfig;
pub use crate::core::bluetooth::{BleAdapter, BluestAdapter, BpError, BpResult, ConnectionState};
pub use crate::core::{BloodPressureMonitor, Reading, SessionOutcome};
