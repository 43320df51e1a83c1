//! ANT+ Stride Based Speed and Distance Monitor Profile
//!
//! Device Type: 124. Page 1 carries distance (1/16 m, wraps at 256 m),
//! instantaneous speed (1/256 m/s) and a wrapping stride count.

use super::{is_common_page, page_number, AntProfilePage};
use crate::sensors::measurement::MeasurementKind;
use crate::sensors::telemetry::{
    push_speed, CumulativeCounter, DecodeContext, Sample, TelemetryDecoder,
};
use crate::sensors::types::DecodeError;

/// Speed and distance data page number
pub const SPEED_DISTANCE_PAGE: u8 = 1;

/// Speed and distance page (Page 1)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrideSpeedDistancePage {
    /// Distance in 1/16 m units, 12-bit counter
    pub distance: u16,
    /// Instantaneous speed in m/s
    pub speed: f64,
    /// Cumulative stride count (wraps at 255)
    pub stride_count: u8,
}

impl AntProfilePage for StrideSpeedDistancePage {
    fn page_number(&self) -> u8 {
        SPEED_DISTANCE_PAGE
    }

    fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        let page = page_number(data)?;
        if page != SPEED_DISTANCE_PAGE {
            return Err(DecodeError::UnexpectedPage(page));
        }

        let distance = ((data[3] as u16) << 4) | ((data[4] >> 4) as u16);
        let speed = (data[4] & 0x0F) as f64 + data[5] as f64 / 256.0;

        Ok(Self {
            distance,
            speed,
            stride_count: data[6],
        })
    }
}

/// Decoder for ANT+ foot pods.
#[derive(Debug)]
pub struct SdmDecoder {
    distance: CumulativeCounter,
    strides: CumulativeCounter,
    stall_threshold: u32,
    unchanged: u32,
}

impl SdmDecoder {
    pub fn new(stall_threshold: u32) -> Self {
        Self {
            distance: CumulativeCounter::new(12),
            strides: CumulativeCounter::new(8),
            stall_threshold: stall_threshold.max(1),
            unchanged: 0,
        }
    }
}

impl TelemetryDecoder for SdmDecoder {
    fn decode(&mut self, payload: &[u8], ctx: &DecodeContext) -> Result<Vec<Sample>, DecodeError> {
        let page = page_number(payload)?;
        if page != SPEED_DISTANCE_PAGE {
            if is_common_page(page) {
                return Ok(Vec::new());
            }
            return Err(DecodeError::UnexpectedPage(page));
        }

        let page = StrideSpeedDistancePage::parse(payload)?;
        let mut samples = Vec::new();

        let distance = self.distance.update(page.distance as u64);
        let strides = self.strides.update(page.stride_count as u64);

        match distance {
            Some(0) => self.unchanged = self.unchanged.saturating_add(1),
            _ => self.unchanged = 0,
        }

        // A pod that stopped moving may keep repeating its last speed.
        let speed = if self.unchanged >= self.stall_threshold {
            0.0
        } else {
            ctx.calibration * page.speed
        };
        push_speed(&mut samples, speed);

        if let Some(delta) = distance.filter(|d| *d > 0) {
            samples.push(Sample::Delta(
                MeasurementKind::Distance,
                ctx.calibration * delta as f64 / 16.0,
            ));
        }
        if let Some(delta) = strides.filter(|d| *d > 0) {
            samples.push(Sample::Delta(MeasurementKind::Strides, delta as f64));
        }

        Ok(samples)
    }

    fn clear(&mut self) {
        self.distance.clear();
        self.strides.clear();
        self.unchanged = 0;
    }
}
