//! Blood pressure measurement frames and the reading they accumulate into.
//!
//! The cuff sends fixed-layout frames (little-endian `u16`s):
//!
//! ```text
//! offset 0  flags                    (not interpreted, mmHg assumed)
//! offset 1  systolic                 mmHg
//! offset 3  diastolic                mmHg
//! offset 5  mean arterial pressure   mmHg
//! offset 7  pulse rate               bpm
//! ```
//!
//! While the cuff inflates only systolic is live; the frame carrying the pulse
//! rate is the final one. An 8-byte frame is cut off inside the pulse rate: its
//! three pressures are taken, but it does not complete the reading. Optional fields selected by the flags byte, as in the
//! generic Blood Pressure Service, are not decoded.

use std::fmt;

use serde::{Deserialize, Serialize};

const SYSTOLIC_OFFSET: usize = 1;
const DIASTOLIC_OFFSET: usize = 3;
const ARTERIAL_OFFSET: usize = 5;
const PULSE_RATE_OFFSET: usize = 7;

/// Frames up to this length only carry systolic.
const PARTIAL_FRAME_MAX_LEN: usize = 7;

/// Shortest frame that carries the pulse rate.
const COMPLETE_FRAME_MIN_LEN: usize = PULSE_RATE_OFFSET + 2;

/// What a single frame did to the accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Too short to carry anything
    Ignored,
    /// Progress update that does not finish the reading
    Partial,
    /// All four values, the reading is complete
    Complete,
}

/// Accumulated blood pressure reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    /// mmHg
    pub systolic: u16,
    /// mmHg
    pub diastolic: u16,
    /// mmHg
    pub mean_arterial_pressure: u16,
    /// bpm
    pub pulse_rate: u16,
    /// Set once a frame carrying the pulse rate has been decoded
    pub complete: bool,
}

impl Reading {
    /// Applies one notification payload. Never fails and never reads past the
    /// frame: frames shorter than three bytes are ignored and no other length is rejected.
    pub fn apply_frame(&mut self, frame: &[u8]) -> FrameKind {
        if frame.len() >= COMPLETE_FRAME_MIN_LEN {
            self.read_pressures(frame);
            self.pulse_rate = read_u16(frame, PULSE_RATE_OFFSET);
            self.complete = true;
            FrameKind::Complete
        } else if frame.len() > PARTIAL_FRAME_MAX_LEN {
            self.read_pressures(frame);
            FrameKind::Partial
        } else if frame.len() >= SYSTOLIC_OFFSET + 2 {
            self.systolic = read_u16(frame, SYSTOLIC_OFFSET);
            FrameKind::Partial
        } else {
            FrameKind::Ignored
        }
    }

    fn read_pressures(&mut self, frame: &[u8]) {
        self.systolic = read_u16(frame, SYSTOLIC_OFFSET);
        self.diastolic = read_u16(frame, DIASTOLIC_OFFSET);
        self.mean_arterial_pressure = read_u16(frame, ARTERIAL_OFFSET);
    }
}

/// Decodes a single frame into a fresh reading.
pub fn decode_frame(frame: &[u8]) -> Reading {
    let mut reading = Reading::default();
    reading.apply_frame(frame);
    reading
}

fn read_u16(frame: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([frame[offset], frame[offset + 1]])
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Systolic: {} mmHg, Diastolic: {} mmHg, Arterial Pressure: {} mmHg, Pulse Rate: {} bpm",
            self.systolic, self.diastolic, self.mean_arterial_pressure, self.pulse_rate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_frame(sys: u16, dia: u16, map: u16, pulse: u16) -> Vec<u8> {
        let mut frame = vec![0x1E];
        for v in [sys, dia, map, pulse] {
            frame.extend_from_slice(&v.to_le_bytes());
        }
        frame
    }

    #[test]
    fn test_complete_frame() {
        let reading = decode_frame(&full_frame(120, 80, 93, 65));
        assert!(reading.complete);
        assert_eq!(
            (reading.systolic, reading.diastolic, reading.mean_arterial_pressure, reading.pulse_rate),
            (120, 80, 93, 65)
        );
    }

    #[test]
    fn test_frame_with_measurement_status_is_complete() {
        let mut frame = full_frame(0x0134, 0x0102, 0x00FF, 0x0050);
        frame.extend_from_slice(&[0x00, 0x00]);
        let reading = decode_frame(&frame);
        assert!(reading.complete);
        assert_eq!(reading.systolic, 0x0134);
        assert_eq!(reading.pulse_rate, 0x0050);
    }

    #[test]
    fn test_partial_frames_only_touch_systolic() {
        let mut reading = Reading {
            diastolic: 7,
            ..Default::default()
        };
        for len in 3..=7 {
            let frame: Vec<u8> = (0..len as u8).collect();
            assert_eq!(reading.apply_frame(&frame), FrameKind::Partial);
            assert_eq!(reading.systolic, u16::from_le_bytes([1, 2]));
            assert_eq!(reading.diastolic, 7);
            assert!(!reading.complete);
        }
    }

    #[test]
    fn test_truncated_final_frame_does_not_complete() {
        let mut reading = Reading {
            pulse_rate: 61,
            ..Default::default()
        };
        let frame = &full_frame(120, 80, 93, 65)[..8];
        assert_eq!(reading.apply_frame(frame), FrameKind::Partial);
        assert_eq!(
            (reading.systolic, reading.diastolic, reading.mean_arterial_pressure),
            (120, 80, 93)
        );
        assert_eq!(reading.pulse_rate, 61);
        assert!(!reading.complete);
    }

    #[test]
    fn test_short_frames_are_ignored() {
        let mut reading = Reading {
            systolic: 42,
            ..Default::default()
        };
        assert_eq!(reading.apply_frame(&[]), FrameKind::Ignored);
        assert_eq!(reading.apply_frame(&[0x00, 0x78]), FrameKind::Ignored);
        assert_eq!(reading.systolic, 42);
    }

    #[test]
    fn test_display() {
        let reading = decode_frame(&full_frame(120, 80, 93, 65));
        assert_eq!(
            reading.to_string(),
            "Systolic: 120 mmHg, Diastolic: 80 mmHg, Arterial Pressure: 93 mmHg, Pulse Rate: 65 bpm"
        );
    }
}
