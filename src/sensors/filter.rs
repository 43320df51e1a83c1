//! Suppression of transient missing readings.
//!
//! A single dropped packet must not flicker a displayed or recorded value to
//! absent, so "no reading" only propagates after `threshold` consecutive misses.

use serde::{Deserialize, Serialize};

use crate::sensors::types::SensorValue;

/// Default number of consecutive missing readings before a value is dropped.
pub const DEFAULT_ABSENT_THRESHOLD: u32 = 8;

/// What the downstream sensor should do with a filtered sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FilterDecision {
    /// Publish this value
    Value(SensorValue),
    /// Keep the current value unchanged
    Hold,
    /// Publish "absent"
    Absent,
}

/// Consecutive-absent counter in front of a raw value source.
#[derive(Debug, Clone)]
pub struct ThresholdFilter {
    threshold: u32,
    consecutive_absent: u32,
}

impl ThresholdFilter {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive_absent: 0,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn consecutive_absent(&self) -> u32 {
        self.consecutive_absent
    }

    /// Feed one raw sample (`None` = no reading).
    pub fn push(&mut self, sample: Option<SensorValue>) -> FilterDecision {
        match sample {
            Some(value) => {
                self.consecutive_absent = 0;
                FilterDecision::Value(value)
            }
            None => {
                self.consecutive_absent = self.consecutive_absent.saturating_add(1);
                if self.consecutive_absent == self.threshold {
                    FilterDecision::Absent
                } else {
                    FilterDecision::Hold
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.consecutive_absent = 0;
    }
}

impl Default for ThresholdFilter {
    fn default() -> Self {
        Self::new(DEFAULT_ABSENT_THRESHOLD)
    }
}
