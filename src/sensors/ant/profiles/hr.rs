//! ANT+ Heart Rate Profile
//!
//! Device Type: 120. Every data page carries the beat event time, beat count
//! and computed heart rate in bytes 4-7.

use super::{is_common_page, page_number, AntProfilePage};
use crate::sensors::measurement::MeasurementKind;
use crate::sensors::telemetry::{DecodeContext, Sample, TelemetryDecoder};
use crate::sensors::types::{DecodeError, SensorValue};

/// Generic heart rate page for any page number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartRateData {
    /// Page number (0-7)
    pub page_number: u8,
    /// Whether page change toggle bit is set
    pub page_change_toggle: bool,
    /// Heart beat event time (1/1024 second resolution)
    pub beat_time: u16,
    /// Heart beat count (wraps at 255)
    pub beat_count: u8,
    /// Computed heart rate in BPM, 0 when invalid
    pub heart_rate: u8,
}

impl AntProfilePage for HeartRateData {
    fn page_number(&self) -> u8 {
        self.page_number
    }

    fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        let page_number = page_number(data)?;

        Ok(Self {
            page_number,
            page_change_toggle: (data[0] & 0x80) != 0,
            beat_time: u16::from_le_bytes([data[4], data[5]]),
            beat_count: data[6],
            heart_rate: data[7],
        })
    }
}

impl HeartRateData {
    /// Heart rate in BPM, `None` when the monitor reports no valid value.
    pub fn reading(&self) -> Option<u8> {
        (self.heart_rate != 0).then_some(self.heart_rate)
    }
}

/// Decoder for ANT+ heart rate monitors.
#[derive(Debug, Default)]
pub struct AntHeartRateDecoder;

impl AntHeartRateDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl TelemetryDecoder for AntHeartRateDecoder {
    fn decode(&mut self, payload: &[u8], _ctx: &DecodeContext) -> Result<Vec<Sample>, DecodeError> {
        if is_common_page(page_number(payload)?) {
            return Ok(Vec::new());
        }

        let page = HeartRateData::parse(payload)?;
        Ok(vec![Sample::Value(
            MeasurementKind::HeartRate,
            page.reading().map(|bpm| SensorValue::Integer(bpm as i64)),
        )])
    }

    fn clear(&mut self) {}
}
