//! RSC Measurement (0x2A53)

use std::time::{Duration, Instant};

use crate::sensors::measurement::MeasurementKind;
use crate::sensors::telemetry::{
    push_speed, CumulativeCounter, DecodeContext, PayloadReader, Sample, TelemetryDecoder,
};
use crate::sensors::types::{DecodeError, SensorValue};

/// Longest gap between notifications that is still integrated over.
const MAX_INTEGRATION_GAP: Duration = Duration::from_secs(5);

/// Parsed RSC Measurement notification.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RscMeasurement {
    /// Instantaneous speed in m/s
    pub speed: f64,
    /// Instantaneous cadence in strides per minute
    pub cadence: u8,
    /// Stride length in meters
    pub stride_length: Option<f64>,
    /// Total distance in 1/10 m units
    pub total_distance: Option<u32>,
    /// Walking (false) or running (true), if reported
    pub running: bool,
}

impl RscMeasurement {
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = PayloadReader::new(data);
        let flags = reader.u8()?;

        let mut result = Self {
            speed: reader.u16()? as f64 / 256.0,
            cadence: reader.u8()?,
            running: (flags & 0x04) != 0,
            ..Default::default()
        };

        if (flags & 0x01) != 0 {
            result.stride_length = Some(reader.u16()? as f64 / 100.0);
        }

        if (flags & 0x02) != 0 {
            result.total_distance = Some(reader.u32()?);
        }

        Ok(result)
    }
}

/// Decoder for running foot pods.
#[derive(Debug)]
pub struct RscDecoder {
    distance: CumulativeCounter,
    last_received: Option<Instant>,
}

impl RscDecoder {
    pub fn new() -> Self {
        Self {
            distance: CumulativeCounter::new(32),
            last_received: None,
        }
    }
}

impl Default for RscDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryDecoder for RscDecoder {
    fn decode(&mut self, payload: &[u8], ctx: &DecodeContext) -> Result<Vec<Sample>, DecodeError> {
        let measurement = RscMeasurement::parse(payload)?;
        let mut samples = Vec::new();

        let speed = ctx.calibration * measurement.speed;
        push_speed(&mut samples, speed);
        samples.push(Sample::Value(
            MeasurementKind::Cadence,
            Some(SensorValue::Real(measurement.cadence as f64)),
        ));

        let elapsed = self
            .last_received
            .map(|last| ctx.received_at.saturating_duration_since(last))
            .filter(|gap| *gap <= MAX_INTEGRATION_GAP);
        self.last_received = Some(ctx.received_at);

        match measurement.total_distance {
            Some(total) => {
                if let Some(delta) = self.distance.update(total as u64) {
                    samples.push(Sample::Delta(
                        MeasurementKind::Distance,
                        ctx.calibration * delta as f64 / 10.0,
                    ));
                }
            }
            None => {
                if let Some(gap) = elapsed {
                    samples.push(Sample::Delta(
                        MeasurementKind::Distance,
                        speed * gap.as_secs_f64(),
                    ));
                }
            }
        }

        if let Some(gap) = elapsed {
            let strides = measurement.cadence as f64 * gap.as_secs_f64() / 60.0;
            samples.push(Sample::Delta(MeasurementKind::Strides, strides));
        }

        Ok(samples)
    }

    fn clear(&mut self) {
        self.distance.clear();
        self.last_received = None;
    }
}
