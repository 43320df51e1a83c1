//! ANT+ Bike Speed and Cadence Profiles
//!
//! Device Types: 121 (combined), 122 (cadence only), 123 (speed only).
//! Revolution counts and event times are 16-bit, times in 1/1024 s.

use super::PAGE_LEN;
use crate::sensors::ant::AntDeviceType;
use crate::sensors::telemetry::{
    CrankTracker, DecodeContext, Sample, TelemetryDecoder, WheelTracker,
};
use crate::sensors::types::DecodeError;

const EVENT_TICKS_PER_SECOND: f64 = 1024.0;

/// Revolution data carried by a speed and/or cadence page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpeedCadencePage {
    /// Crank event time and cumulative crank revolutions
    pub cadence: Option<(u16, u16)>,
    /// Wheel event time and cumulative wheel revolutions
    pub speed: Option<(u16, u16)>,
}

impl SpeedCadencePage {
    /// Parse a page broadcast by a device of `device_type`.
    pub fn parse(device_type: AntDeviceType, data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < PAGE_LEN {
            return Err(DecodeError::TooShort {
                needed: PAGE_LEN,
                actual: data.len(),
            });
        }

        let word = |i: usize| u16::from_le_bytes([data[i], data[i + 1]]);

        match device_type {
            // Combined sensors have no page number byte.
            AntDeviceType::SpeedCadence => Ok(Self {
                cadence: Some((word(0), word(2))),
                speed: Some((word(4), word(6))),
            }),
            AntDeviceType::Cadence => Ok(Self {
                cadence: Some((word(4), word(6))),
                speed: None,
            }),
            AntDeviceType::Speed => Ok(Self {
                cadence: None,
                speed: Some((word(4), word(6))),
            }),
            other => Err(DecodeError::InconsistentFlags(format!(
                "device type {} is not a speed/cadence sensor",
                other.device_type_number()
            ))),
        }
    }
}

/// Decoder for ANT+ speed, cadence and combined sensors.
#[derive(Debug)]
pub struct BikeSpeedCadenceDecoder {
    device_type: AntDeviceType,
    wheel: WheelTracker,
    crank: CrankTracker,
}

impl BikeSpeedCadenceDecoder {
    pub fn new(device_type: AntDeviceType, stall_threshold: u32) -> Self {
        Self {
            device_type,
            wheel: WheelTracker::new(16, 16, EVENT_TICKS_PER_SECOND, stall_threshold),
            crank: CrankTracker::new(16, 16, EVENT_TICKS_PER_SECOND, stall_threshold),
        }
    }
}

impl TelemetryDecoder for BikeSpeedCadenceDecoder {
    fn decode(&mut self, payload: &[u8], ctx: &DecodeContext) -> Result<Vec<Sample>, DecodeError> {
        let page = SpeedCadencePage::parse(self.device_type, payload)?;
        let mut samples = Vec::new();

        if let Some((time, revs)) = page.speed {
            self.wheel.update(revs as u64, time as u64, ctx, &mut samples);
        }
        if let Some((time, revs)) = page.cadence {
            self.crank.update(revs as u64, time as u64, &mut samples);
        }

        Ok(samples)
    }

    fn clear(&mut self) {
        self.wheel.clear();
        self.crank.clear();
    }
}
