//! Cycling Power Measurement (0x2A63)

use crate::sensors::measurement::MeasurementKind;
use crate::sensors::telemetry::{
    CrankTracker, CumulativeCounter, DecodeContext, PayloadReader, Sample, TelemetryDecoder,
    WheelTracker,
};
use crate::sensors::types::{DecodeError, SensorValue};

const WHEEL_TICKS_PER_SECOND: f64 = 2048.0;
const CRANK_TICKS_PER_SECOND: f64 = 1024.0;

/// Parsed Cycling Power Measurement notification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CyclingPowerMeasurement {
    /// Instantaneous power in watts
    pub instant_power: i16,
    /// Pedal power balance in percent of the reference pedal (0.5% resolution)
    pub balance: Option<f64>,
    /// Whether the balance reference is the left pedal
    pub balance_reference_left: bool,
    /// Cumulative wheel revolutions, last event time (1/2048 s)
    pub wheel: Option<(u32, u16)>,
    /// Cumulative crank revolutions, last event time (1/1024 s)
    pub crank: Option<(u16, u16)>,
    /// Accumulated energy in kJ
    pub accumulated_energy: Option<u16>,
}

impl CyclingPowerMeasurement {
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = PayloadReader::new(data);
        let flags = reader.u16()?;

        if (flags & 0x0040) != 0 && (flags & 0x0080) != 0 {
            return Err(DecodeError::InconsistentFlags(
                "extreme force and extreme torque are mutually exclusive".to_string(),
            ));
        }

        let mut result = Self {
            instant_power: reader.i16()?,
            balance_reference_left: (flags & 0x0002) != 0,
            ..Default::default()
        };

        // Pedal Power Balance (bit 0)
        if (flags & 0x0001) != 0 {
            result.balance = Some(reader.u8()? as f64 / 2.0);
        }

        // Accumulated Torque (bit 2)
        if (flags & 0x0004) != 0 {
            reader.skip(2)?;
        }

        // Wheel Revolution Data (bit 4)
        if (flags & 0x0010) != 0 {
            result.wheel = Some((reader.u32()?, reader.u16()?));
        }

        // Crank Revolution Data (bit 5)
        if (flags & 0x0020) != 0 {
            result.crank = Some((reader.u16()?, reader.u16()?));
        }

        // Extreme Force / Torque Magnitudes (bits 6, 7)
        if (flags & 0x00C0) != 0 {
            reader.skip(4)?;
        }

        // Extreme Angles (bit 8), packed 12 + 12 bits
        if (flags & 0x0100) != 0 {
            reader.skip(3)?;
        }

        // Top / Bottom Dead Spot Angles (bits 9, 10)
        if (flags & 0x0200) != 0 {
            reader.skip(2)?;
        }
        if (flags & 0x0400) != 0 {
            reader.skip(2)?;
        }

        // Accumulated Energy (bit 11)
        if (flags & 0x0800) != 0 {
            result.accumulated_energy = Some(reader.u16()?);
        }

        Ok(result)
    }
}

/// Decoder for BLE power meters.
#[derive(Debug)]
pub struct CyclingPowerDecoder {
    wheel: WheelTracker,
    crank: CrankTracker,
    energy: CumulativeCounter,
}

impl CyclingPowerDecoder {
    pub fn new(stall_threshold: u32) -> Self {
        Self {
            wheel: WheelTracker::new(32, 16, WHEEL_TICKS_PER_SECOND, stall_threshold),
            crank: CrankTracker::new(16, 16, CRANK_TICKS_PER_SECOND, stall_threshold),
            energy: CumulativeCounter::new(16).with_reset_detection(),
        }
    }
}

impl TelemetryDecoder for CyclingPowerDecoder {
    fn decode(&mut self, payload: &[u8], ctx: &DecodeContext) -> Result<Vec<Sample>, DecodeError> {
        let measurement = CyclingPowerMeasurement::parse(payload)?;

        let mut samples = vec![Sample::Value(
            MeasurementKind::Power,
            Some(SensorValue::Integer(measurement.instant_power.max(0) as i64)),
        )];

        if let Some(balance) = measurement.balance {
            samples.push(Sample::Value(
                MeasurementKind::PowerBalance,
                Some(SensorValue::Real(balance)),
            ));
        }

        if let Some((revs, time)) = measurement.wheel {
            self.wheel.update(revs as u64, time as u64, ctx, &mut samples);
        }
        if let Some((revs, time)) = measurement.crank {
            self.crank.update(revs as u64, time as u64, &mut samples);
        }

        if let Some(kj) = measurement.accumulated_energy {
            // Mechanical kJ at ~24% efficiency is roughly one kcal burned.
            if let Some(delta) = self.energy.update(kj as u64) {
                samples.push(Sample::Delta(MeasurementKind::Calories, delta as f64));
            }
        }

        Ok(samples)
    }

    fn clear(&mut self) {
        self.wheel.clear();
        self.crank.clear();
        self.energy.clear();
    }
}
