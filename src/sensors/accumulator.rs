//! Monotonic counters that survive device churn, laps and session resumption.
//!
//! An accumulator reports `offset + raw`: `raw` is the sum of device-reported
//! increments and `offset` is a baseline that only [`AccumulatorCell::seed`] and
//! [`AccumulatorCell::reset`] move.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::sensors::sensor::{lock, Sensor};
use crate::sensors::types::{SensorError, SensorValue};

/// Shared user-pause state of a tracking session.
#[derive(Debug, Clone, Default)]
pub struct SessionPause(Arc<AtomicBool>);

impl SessionPause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Accumulation {
    raw: f64,
    offset: f64,
}

impl Accumulation {
    fn effective(&self) -> f64 {
        self.offset + self.raw
    }
}

/// Accumulator-backed sensor.
#[derive(Debug)]
pub struct AccumulatorCell {
    sensor: Arc<Sensor>,
    state: Mutex<Accumulation>,
    respect_pause: bool,
    pause: SessionPause,
}

impl AccumulatorCell {
    /// Wrap a sensor of an accumulated kind.
    pub fn new(
        sensor: Arc<Sensor>,
        pause: SessionPause,
        respect_pause: bool,
    ) -> Result<Self, SensorError> {
        if !sensor.kind().is_accumulator() {
            return Err(SensorError::NotAccumulator(sensor.kind()));
        }

        Ok(Self {
            sensor,
            state: Mutex::new(Accumulation::default()),
            respect_pause,
            pause,
        })
    }

    pub fn sensor(&self) -> &Arc<Sensor> {
        &self.sensor
    }

    pub fn value(&self) -> Option<SensorValue> {
        self.sensor.value()
    }

    /// Continue a previously persisted total.
    pub fn seed(&self, value: f64) -> Result<(), SensorError> {
        let kind = self.sensor.kind();
        if !kind.accepts(value) {
            tracing::warn!("Rejected seed {} for {}", value, kind);
            return Err(SensorError::InvalidSeed { kind, value });
        }

        self.update(|state| state.offset = value);
        Ok(())
    }

    /// Make the effective value equal `zero` while the raw count keeps running.
    pub fn reset(&self, zero: f64) -> Result<(), SensorError> {
        let kind = self.sensor.kind();
        if !kind.accepts(zero) {
            tracing::warn!("Rejected reset to {} for {}", zero, kind);
            return Err(SensorError::InvalidSeed { kind, value: zero });
        }

        self.update(|state| state.offset = zero - state.raw);
        Ok(())
    }

    /// Add a device-reported delta. Returns whether it was applied.
    pub fn increment(&self, delta: f64) -> bool {
        if !delta.is_finite() || delta < 0.0 {
            tracing::debug!("Dropped invalid {} increment {}", self.sensor.kind(), delta);
            return false;
        }

        if self.respect_pause && self.pause.is_paused() {
            return false;
        }

        self.update(|state| state.raw += delta);
        true
    }

    fn update(&self, apply: impl FnOnce(&mut Accumulation)) {
        {
            // Commit under the lock so concurrent increments publish in order.
            let mut state = lock(&self.state);
            apply(&mut state);
            let kind = self.sensor.kind();
            self.sensor.commit(Some(kind.value_of(state.effective())));
        }
        self.sensor.notify();
    }
}
