//! CSC Measurement (0x2A5B)
//!
//! Wheel: u32 cumulative revolutions, u16 last event time (1/1024 s).
//! Crank: u16 cumulative revolutions, u16 last event time (1/1024 s).

use crate::sensors::telemetry::{
    CrankTracker, DecodeContext, PayloadReader, Sample, TelemetryDecoder, WheelTracker,
};
use crate::sensors::types::DecodeError;

const EVENT_TICKS_PER_SECOND: f64 = 1024.0;

/// Parsed CSC Measurement notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CscMeasurement {
    /// Cumulative wheel revolutions and last wheel event time
    pub wheel: Option<(u32, u16)>,
    /// Cumulative crank revolutions and last crank event time
    pub crank: Option<(u16, u16)>,
}

impl CscMeasurement {
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = PayloadReader::new(data);
        let flags = reader.u8()?;
        let mut result = Self::default();

        if (flags & 0x01) != 0 {
            result.wheel = Some((reader.u32()?, reader.u16()?));
        }

        if (flags & 0x02) != 0 {
            result.crank = Some((reader.u16()?, reader.u16()?));
        }

        Ok(result)
    }
}

/// Decoder for speed-only, cadence-only and combined sensors.
#[derive(Debug)]
pub struct CscDecoder {
    wheel: WheelTracker,
    crank: CrankTracker,
}

impl CscDecoder {
    pub fn new(stall_threshold: u32) -> Self {
        Self {
            wheel: WheelTracker::new(32, 16, EVENT_TICKS_PER_SECOND, stall_threshold),
            crank: CrankTracker::new(16, 16, EVENT_TICKS_PER_SECOND, stall_threshold),
        }
    }
}

impl TelemetryDecoder for CscDecoder {
    fn decode(&mut self, payload: &[u8], ctx: &DecodeContext) -> Result<Vec<Sample>, DecodeError> {
        let measurement = CscMeasurement::parse(payload)?;
        let mut samples = Vec::new();

        if let Some((revs, time)) = measurement.wheel {
            self.wheel.update(revs as u64, time as u64, ctx, &mut samples);
        }
        if let Some((revs, time)) = measurement.crank {
            self.crank.update(revs as u64, time as u64, &mut samples);
        }

        Ok(samples)
    }

    fn clear(&mut self) {
        self.wheel.clear();
        self.crank.clear();
    }
}
