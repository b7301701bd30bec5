//! Core functionality for the blood pressure monitor
//! This module contains the BLE plumbing, the frame decoder and the reading session.

pub mod bluetooth;
pub mod monitor;
pub mod reading;
pub mod session;

// Re-export commonly used types
pub use monitor::BloodPressureMonitor;
pub use reading::{FrameKind, Reading, decode_frame};
pub use session::{SessionOutcome, SessionPhase};
