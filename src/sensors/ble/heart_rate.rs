//! Heart Rate Measurement (0x2A37)

use crate::sensors::measurement::MeasurementKind;
use crate::sensors::telemetry::{
    CumulativeCounter, DecodeContext, PayloadReader, Sample, TelemetryDecoder,
};
use crate::sensors::types::{DecodeError, SensorValue};

const KJ_PER_KCAL: f64 = 4.184;

/// Parsed Heart Rate Measurement notification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeartRateMeasurement {
    /// Heart rate in BPM
    pub heart_rate_bpm: u16,
    /// Whether the sensor reports skin contact detection at all
    pub contact_supported: bool,
    /// Skin contact detected
    pub contact: bool,
    /// Cumulative energy expended in kJ
    pub energy_expended: Option<u16>,
    /// RR intervals (1/1024 second resolution)
    pub rr_intervals: Vec<u16>,
}

impl HeartRateMeasurement {
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = PayloadReader::new(data);
        let flags = reader.u8()?;

        let hr_format_u16 = (flags & 0x01) != 0;
        let contact_supported = (flags & 0x04) != 0;
        let contact = contact_supported && (flags & 0x02) != 0;
        let energy_present = (flags & 0x08) != 0;
        let rr_present = (flags & 0x10) != 0;

        let heart_rate_bpm = if hr_format_u16 {
            reader.u16()?
        } else {
            reader.u8()? as u16
        };

        let energy_expended = if energy_present {
            Some(reader.u16()?)
        } else {
            None
        };

        let mut rr_intervals = Vec::new();
        if rr_present {
            while data.len() >= reader.offset() + 2 {
                rr_intervals.push(reader.u16()?);
            }
        }

        Ok(Self {
            heart_rate_bpm,
            contact_supported,
            contact,
            energy_expended,
            rr_intervals,
        })
    }

    /// Heart rate, or `None` when contact is lost or no beat is measured.
    pub fn reading(&self) -> Option<u16> {
        if self.contact_supported && !self.contact {
            return None;
        }
        (self.heart_rate_bpm > 0).then_some(self.heart_rate_bpm)
    }
}

/// Decoder for heart rate monitors.
#[derive(Debug)]
pub struct HeartRateDecoder {
    energy: CumulativeCounter,
}

impl HeartRateDecoder {
    pub fn new() -> Self {
        Self {
            energy: CumulativeCounter::new(16).with_reset_detection(),
        }
    }
}

impl Default for HeartRateDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryDecoder for HeartRateDecoder {
    fn decode(&mut self, payload: &[u8], _ctx: &DecodeContext) -> Result<Vec<Sample>, DecodeError> {
        let measurement = HeartRateMeasurement::parse(payload)?;

        let mut samples = vec![Sample::Value(
            MeasurementKind::HeartRate,
            measurement
                .reading()
                .map(|bpm| SensorValue::Integer(bpm as i64)),
        )];

        if let Some(kj) = measurement.energy_expended {
            if let Some(delta) = self.energy.update(kj as u64) {
                samples.push(Sample::Delta(
                    MeasurementKind::Calories,
                    delta as f64 / KJ_PER_KCAL,
                ));
            }
        }

        Ok(samples)
    }

    fn clear(&mut self) {
        self.energy.clear();
    }
}
