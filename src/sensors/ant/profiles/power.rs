//! ANT+ Cycling Power Profile
//!
//! Device Type: 11. Power is reported as the average over the update events
//! since the previous page, from the wrapping accumulated power and event
//! count fields of the power-only page.

use super::{is_common_page, page_number, AntProfilePage};
use crate::sensors::measurement::MeasurementKind;
use crate::sensors::telemetry::{
    CounterReading, DecodeContext, RevolutionCounter, Sample, TelemetryDecoder,
};
use crate::sensors::types::{DecodeError, SensorValue};

/// Power-only data page number
pub const POWER_ONLY_PAGE: u8 = 0x10;
/// Torque effectiveness and pedal smoothness page number
pub const TORQUE_EFFECTIVENESS_PAGE: u8 = 0x13;

/// Power-only data page (Page 0x10 / 16)
#[derive(Debug, Clone, PartialEq)]
pub struct PowerOnlyPage {
    /// Update event count (wraps at 255)
    pub event_count: u8,
    /// Pedal power contribution in percent
    pub pedal_power: Option<PedalPower>,
    /// Instantaneous cadence (if available)
    pub cadence: Option<u8>,
    /// Accumulated power (wraps at 65535)
    pub accumulated_power: u16,
    /// Instantaneous power in watts
    pub instantaneous_power: u16,
}

/// Pedal power contribution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PedalPower {
    /// Contribution in percent (0-100)
    pub percent: u8,
    /// Whether the contribution is that of the right pedal
    pub right: bool,
}

impl PedalPower {
    /// Left pedal share, when the pedal is known.
    pub fn left_percent(&self) -> f64 {
        if self.right {
            100.0 - self.percent as f64
        } else {
            self.percent as f64
        }
    }
}

impl AntProfilePage for PowerOnlyPage {
    fn page_number(&self) -> u8 {
        POWER_ONLY_PAGE
    }

    fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        let page = page_number(data)?;
        if page != POWER_ONLY_PAGE {
            return Err(DecodeError::UnexpectedPage(page));
        }

        let pedal_power = if data[2] == 0xFF {
            None
        } else {
            Some(PedalPower {
                percent: data[2] & 0x7F,
                right: (data[2] & 0x80) != 0,
            })
        };

        Ok(Self {
            event_count: data[1],
            pedal_power,
            cadence: if data[3] == 0xFF { None } else { Some(data[3]) },
            accumulated_power: u16::from_le_bytes([data[4], data[5]]),
            instantaneous_power: u16::from_le_bytes([data[6], data[7]]),
        })
    }
}

/// Torque effectiveness and pedal smoothness page (Page 0x13 / 19)
#[derive(Debug, Clone, PartialEq)]
pub struct TorqueEffectivenessPage {
    /// Update event count
    pub event_count: u8,
    /// Left torque effectiveness (0-100%)
    pub left_torque_effectiveness: Option<f64>,
    /// Right torque effectiveness (0-100%)
    pub right_torque_effectiveness: Option<f64>,
    /// Left or combined pedal smoothness (0-100%)
    pub left_pedal_smoothness: Option<f64>,
    /// Right pedal smoothness (0-100%)
    pub right_pedal_smoothness: Option<f64>,
    /// Smoothness is reported as one combined value
    pub combined_smoothness: bool,
}

impl AntProfilePage for TorqueEffectivenessPage {
    fn page_number(&self) -> u8 {
        TORQUE_EFFECTIVENESS_PAGE
    }

    fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        let page = page_number(data)?;
        if page != TORQUE_EFFECTIVENESS_PAGE {
            return Err(DecodeError::UnexpectedPage(page));
        }

        let parse_percent = |b: u8| -> Option<f64> {
            if b >= 0xFE {
                None
            } else {
                Some(b as f64 / 2.0)
            }
        };

        Ok(Self {
            event_count: data[1],
            left_torque_effectiveness: parse_percent(data[2]),
            right_torque_effectiveness: parse_percent(data[3]),
            left_pedal_smoothness: parse_percent(data[4]),
            right_pedal_smoothness: parse_percent(data[5]),
            combined_smoothness: data[5] == 0xFE,
        })
    }
}

impl TorqueEffectivenessPage {
    pub fn torque_effectiveness(&self) -> Option<f64> {
        mean(self.left_torque_effectiveness, self.right_torque_effectiveness)
    }

    pub fn pedal_smoothness(&self) -> Option<f64> {
        if self.combined_smoothness {
            return self.left_pedal_smoothness;
        }
        mean(self.left_pedal_smoothness, self.right_pedal_smoothness)
    }
}

fn mean(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some((a + b) / 2.0),
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    }
}

/// Decoder for ANT+ power meters.
#[derive(Debug)]
pub struct AntPowerDecoder {
    /// Accumulated power against update event count
    events: RevolutionCounter,
}

impl AntPowerDecoder {
    pub fn new(stall_threshold: u32) -> Self {
        Self {
            events: RevolutionCounter::new(16, 8, stall_threshold),
        }
    }

    fn power_only(&mut self, page: PowerOnlyPage, samples: &mut Vec<Sample>) {
        let power = match self
            .events
            .update(page.accumulated_power as u64, page.event_count as u64)
        {
            CounterReading::First => Some(page.instantaneous_power as i64),
            CounterReading::Stalled { force_zero: true } => {
                tracing::debug!("Power update events stalled, forcing power to zero");
                Some(0)
            }
            CounterReading::Stalled { force_zero: false } => None,
            CounterReading::Advanced {
                rev_delta,
                time_delta,
            } => Some((rev_delta as f64 / time_delta as f64).round() as i64),
        };

        if let Some(watts) = power {
            samples.push(Sample::Value(
                MeasurementKind::Power,
                Some(SensorValue::Integer(watts)),
            ));
        }

        if let Some(cadence) = page.cadence {
            samples.push(Sample::Value(
                MeasurementKind::Cadence,
                Some(SensorValue::Real(cadence as f64)),
            ));
        }

        if let Some(pedal) = page.pedal_power {
            samples.push(Sample::Value(
                MeasurementKind::PowerBalance,
                Some(SensorValue::Real(pedal.left_percent())),
            ));
        }
    }
}

impl TelemetryDecoder for AntPowerDecoder {
    fn decode(&mut self, payload: &[u8], _ctx: &DecodeContext) -> Result<Vec<Sample>, DecodeError> {
        let page = page_number(payload)?;
        let mut samples = Vec::new();

        match page {
            POWER_ONLY_PAGE => self.power_only(PowerOnlyPage::parse(payload)?, &mut samples),
            TORQUE_EFFECTIVENESS_PAGE => {
                let page = TorqueEffectivenessPage::parse(payload)?;
                if let Some(te) = page.torque_effectiveness() {
                    samples.push(Sample::Value(
                        MeasurementKind::TorqueEffectiveness,
                        Some(SensorValue::Real(te)),
                    ));
                }
                if let Some(ps) = page.pedal_smoothness() {
                    samples.push(Sample::Value(
                        MeasurementKind::PedalSmoothness,
                        Some(SensorValue::Real(ps)),
                    ));
                }
            }
            p if is_common_page(p) => {}
            p => return Err(DecodeError::UnexpectedPage(p)),
        }

        Ok(samples)
    }

    fn clear(&mut self) {
        self.events.clear();
    }
}
