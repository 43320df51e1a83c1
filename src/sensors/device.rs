//! Connected device: identity, calibration and the sensors it owns.
//!
//! A [`DeviceHandle`] composes one sensor per measurement kind its class
//! can produce, an accumulator cell for every accumulated kind, a threshold
//! filter for every filterable kind, and one protocol decoder.
//!
//! Sensors for a class's core kinds go live on connect. Sensors for optional
//! kinds go live after their first committed reading, so a device that never
//! reports a kind cannot become its best source.

use crossbeam::atomic::AtomicCell;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::sensors::accumulator::{AccumulatorCell, SessionPause};
use crate::sensors::filter::{FilterDecision, ThresholdFilter};
use crate::sensors::measurement::MeasurementKind;
use crate::sensors::sensor::{lock, Sensor};
use crate::sensors::telemetry::{DecodeContext, Sample, TelemetryDecoder};
use crate::sensors::types::{
    ConnectionState, DecodeError, DeviceId, DeviceKind, Protocol, SensorError, SensorValue,
};

/// Construction parameters shared by every device of a session.
#[derive(Debug, Clone)]
pub struct DeviceSettings {
    pub absent_threshold: u32,
    pub respect_pause: bool,
    pub wheel_circumference_m: f64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            absent_threshold: crate::sensors::filter::DEFAULT_ABSENT_THRESHOLD,
            respect_pause: true,
            wheel_circumference_m: 2.1,
        }
    }
}

/// One connected physical device.
pub struct DeviceHandle {
    id: DeviceId,
    protocol: Protocol,
    device_kind: DeviceKind,
    calibration: AtomicCell<f64>,
    state: AtomicCell<ConnectionState>,
    wheel_circumference_m: f64,
    sensors: BTreeMap<MeasurementKind, Arc<Sensor>>,
    accumulators: BTreeMap<MeasurementKind, AccumulatorCell>,
    filters: BTreeMap<MeasurementKind, Mutex<ThresholdFilter>>,
    /// `None` for platform-decoded devices
    decoder: Option<Mutex<Box<dyn TelemetryDecoder>>>,
    /// Optional kinds that reported since the last history clear
    reporting: Mutex<BTreeSet<MeasurementKind>>,
    /// Kinds whose sensors are currently in the registry
    registered: Mutex<BTreeSet<MeasurementKind>>,
}

impl DeviceHandle {
    pub fn new(
        id: DeviceId,
        protocol: Protocol,
        device_kind: DeviceKind,
        decoder: Option<Box<dyn TelemetryDecoder>>,
        pause: &SessionPause,
        settings: &DeviceSettings,
    ) -> Result<Self, SensorError> {
        let mut sensors = BTreeMap::new();
        let mut accumulators = BTreeMap::new();
        let mut filters = BTreeMap::new();

        for kind in device_kind.produces().iter().chain(device_kind.may_produce()) {
            let sensor = Arc::new(Sensor::new(id, device_kind, *kind));
            if kind.is_accumulator() {
                accumulators.insert(
                    *kind,
                    AccumulatorCell::new(sensor.clone(), pause.clone(), settings.respect_pause)?,
                );
            }
            if kind.supports_filtering() {
                filters.insert(*kind, Mutex::new(ThresholdFilter::new(settings.absent_threshold)));
            }
            sensors.insert(*kind, sensor);
        }

        Ok(Self {
            id,
            protocol,
            device_kind,
            calibration: AtomicCell::new(1.0),
            state: AtomicCell::new(ConnectionState::Disconnected),
            wheel_circumference_m: settings.wheel_circumference_m,
            sensors,
            accumulators,
            filters,
            decoder: decoder.map(Mutex::new),
            reporting: Mutex::new(BTreeSet::new()),
            registered: Mutex::new(BTreeSet::new()),
        })
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn device_kind(&self) -> DeviceKind {
        self.device_kind
    }

    pub fn calibration(&self) -> f64 {
        self.calibration.load()
    }

    /// Replace the multiplicative correction applied to wheel-derived values.
    pub fn set_calibration(&self, factor: f64) -> Result<(), SensorError> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(SensorError::InvalidCalibration(factor));
        }
        self.calibration.store(factor);
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        self.state.load()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) -> ConnectionState {
        self.state.swap(state)
    }

    pub fn sensor(&self, kind: MeasurementKind) -> Option<&Arc<Sensor>> {
        self.sensors.get(&kind)
    }

    pub fn sensors(&self) -> impl Iterator<Item = &Arc<Sensor>> {
        self.sensors.values()
    }

    /// Sensors that belong in the registry while connected.
    pub fn live_sensors(&self) -> Vec<Arc<Sensor>> {
        let reporting = lock(&self.reporting);
        self.sensors
            .iter()
            .filter(|(kind, _)| {
                self.device_kind.produces().contains(*kind) || reporting.contains(*kind)
            })
            .map(|(_, sensor)| sensor.clone())
            .collect()
    }

    /// Registered kinds. Held across registry calls so registration and
    /// unregistration of one device never interleave.
    pub(crate) fn registration(&self) -> MutexGuard<'_, BTreeSet<MeasurementKind>> {
        lock(&self.registered)
    }

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::ConnectedWithService
    }

    fn mark_reporting(&self, kind: MeasurementKind) {
        if self.is_connected() && !self.device_kind.produces().contains(&kind) {
            lock(&self.reporting).insert(kind);
        }
    }

    pub fn accumulator(&self, kind: MeasurementKind) -> Option<&AccumulatorCell> {
        self.accumulators.get(&kind)
    }

    /// Continue a persisted total for an accumulated kind.
    pub fn seed(&self, kind: MeasurementKind, value: f64) -> Result<(), SensorError> {
        if !kind.is_accumulator() {
            return Err(SensorError::NotAccumulator(kind));
        }
        self.accumulators
            .get(&kind)
            .ok_or(SensorError::SensorNotFound(self.id, kind))?
            .seed(value)
    }

    /// Restart the lap distance at zero.
    pub fn reset_lap(&self) {
        if let Some(cell) = self.accumulators.get(&MeasurementKind::LapDistance) {
            // Zero is always in the domain of a distance.
            let _ = cell.reset(0.0);
        }
    }

    /// Decode one raw payload and apply its samples.
    ///
    /// A malformed payload is reported without touching any sensor. Payloads
    /// arriving while not connected are dropped before they reach the decoder.
    pub fn ingest(&self, payload: &[u8]) -> Result<usize, DecodeError> {
        let Some(decoder) = &self.decoder else {
            return Ok(0);
        };

        let ctx = DecodeContext::new(self.calibration(), self.wheel_circumference_m);
        let samples = {
            let mut decoder = lock(decoder);
            // Checked under the decoder lock: a disconnect clears history
            // under the same lock after leaving the connected state.
            if !self.is_connected() {
                return Ok(0);
            }
            decoder.decode(payload, &ctx)?
        };

        Ok(samples.into_iter().filter(|s| self.apply(*s)).count())
    }

    /// Route one sample to its sensor. Returns whether anything changed.
    pub fn apply(&self, sample: Sample) -> bool {
        match sample {
            Sample::Value(kind, value) => self.apply_value(kind, value),
            Sample::Delta(kind, delta) => self.apply_delta(kind, delta),
        }
    }

    fn apply_value(&self, kind: MeasurementKind, value: Option<SensorValue>) -> bool {
        let Some(sensor) = self.sensors.get(&kind) else {
            tracing::debug!("Device {} has no {} sensor, sample dropped", self.id, kind);
            return false;
        };

        let value = match self.filters.get(&kind) {
            Some(filter) => match lock(filter).push(value) {
                FilterDecision::Value(v) => Some(v),
                FilterDecision::Hold => return false,
                FilterDecision::Absent => None,
            },
            None => value,
        };

        match sensor.set_value(value) {
            Ok(()) => {
                if value.is_some() {
                    self.mark_reporting(kind);
                }
                true
            }
            Err(e) => {
                tracing::debug!("Device {}: {}", self.id, e);
                false
            }
        }
    }

    fn apply_delta(&self, kind: MeasurementKind, delta: f64) -> bool {
        let Some(cell) = self.accumulators.get(&kind) else {
            tracing::debug!("Device {} has no {} accumulator, delta dropped", self.id, kind);
            return false;
        };

        let applied = cell.increment(delta);
        if applied {
            self.mark_reporting(kind);
            for dependent in kind.dependents() {
                if let Some(cell) = self.accumulators.get(&dependent) {
                    cell.increment(delta);
                    self.mark_reporting(dependent);
                }
            }
        }
        applied
    }

    /// Forget decoder counter history and filter state.
    pub fn clear_history(&self) {
        if let Some(decoder) = &self.decoder {
            lock(decoder).clear();
        }
        for filter in self.filters.values() {
            lock(filter).reset();
        }
        lock(&self.reporting).clear();
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("id", &self.id)
            .field("protocol", &self.protocol)
            .field("device_kind", &self.device_kind)
            .field("calibration", &self.calibration())
            .field("state", &self.state())
            .field("kinds", &self.sensors.keys().collect::<Vec<_>>())
            .finish()
    }
}
