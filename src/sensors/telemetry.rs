//! Shared decoding machinery for wire-level telemetry.
//!
//! Every protocol decoder turns a raw payload into [`Sample`]s. Revolution and
//! event-time counters are fixed width and wrap, so deltas are always taken
//! modulo the counter width; repeated identical event times count towards a
//! device-class stall threshold after which motion is reported as zero.

use std::collections::HashMap;
use std::time::Instant;

use crate::sensors::measurement::MeasurementKind;
use crate::sensors::types::{DecodeError, DeviceKind, Protocol, SensorError, SensorValue};

/// One decoded observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    /// Replace the current value of a kind (`None` = no reading)
    Value(MeasurementKind, Option<SensorValue>),
    /// Add to an accumulated kind
    Delta(MeasurementKind, f64),
}

/// Per-call inputs owned by the device rather than the decoder.
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext {
    /// Multiplicative correction for wheel-derived speed and distance
    pub calibration: f64,
    /// Wheel circumference in meters
    pub wheel_circumference_m: f64,
    /// When the payload was received
    pub received_at: Instant,
}

impl DecodeContext {
    pub fn new(calibration: f64, wheel_circumference_m: f64) -> Self {
        Self {
            calibration,
            wheel_circumference_m,
            received_at: Instant::now(),
        }
    }

    pub fn at(mut self, received_at: Instant) -> Self {
        self.received_at = received_at;
        self
    }
}

/// Uniform decode capability of a device.
pub trait TelemetryDecoder: Send {
    /// Decode one payload. A malformed payload yields an error and no samples.
    fn decode(&mut self, payload: &[u8], ctx: &DecodeContext) -> Result<Vec<Sample>, DecodeError>;

    /// Forget all counter history so a reconnection starts fresh.
    fn clear(&mut self);
}

/// Result of feeding a (revolutions, event time) pair into a [`RevolutionCounter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterReading {
    /// No previous reading; baseline stored
    First,
    /// Event time did not advance
    Stalled { force_zero: bool },
    /// A new event was observed
    Advanced { rev_delta: u64, time_delta: u64 },
}

/// Previous (revolutions, event time) pair of one counter source.
#[derive(Debug, Clone)]
pub struct RevolutionCounter {
    rev_mask: u64,
    time_mask: u64,
    stall_threshold: u32,
    previous: Option<(u64, u64)>,
    identical: u32,
}

fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// `(current - previous) mod 2^bits`.
pub fn wrapping_delta(previous: u64, current: u64, bits: u32) -> u64 {
    current.wrapping_sub(previous) & mask(bits)
}

impl RevolutionCounter {
    pub fn new(rev_bits: u32, time_bits: u32, stall_threshold: u32) -> Self {
        Self {
            rev_mask: mask(rev_bits),
            time_mask: mask(time_bits),
            stall_threshold: stall_threshold.max(1),
            previous: None,
            identical: 0,
        }
    }

    pub fn update(&mut self, revolutions: u64, event_time: u64) -> CounterReading {
        let revolutions = revolutions & self.rev_mask;
        let event_time = event_time & self.time_mask;

        let Some((prev_revs, prev_time)) = self.previous else {
            self.previous = Some((revolutions, event_time));
            self.identical = 0;
            return CounterReading::First;
        };

        let time_delta = event_time.wrapping_sub(prev_time) & self.time_mask;
        if time_delta == 0 {
            self.identical = self.identical.saturating_add(1);
            return CounterReading::Stalled {
                force_zero: self.identical >= self.stall_threshold,
            };
        }

        let rev_delta = revolutions.wrapping_sub(prev_revs) & self.rev_mask;
        self.previous = Some((revolutions, event_time));
        self.identical = 0;

        CounterReading::Advanced {
            rev_delta,
            time_delta,
        }
    }

    pub fn identical_readings(&self) -> u32 {
        self.identical
    }

    pub fn clear(&mut self) {
        self.previous = None;
        self.identical = 0;
    }
}

/// Difference of a wrapping cumulative counter such as accumulated energy.
#[derive(Debug, Clone)]
pub struct CumulativeCounter {
    bits: u32,
    previous: Option<u64>,
    detect_reset: bool,
}

impl CumulativeCounter {
    pub fn new(bits: u32) -> Self {
        Self {
            bits,
            previous: None,
            detect_reset: false,
        }
    }

    /// Treat a step of more than half the counter range as a sensor-side
    /// reset rather than a wrap.
    pub fn with_reset_detection(mut self) -> Self {
        self.detect_reset = true;
        self
    }

    /// Delta since the previous reading; `None` for the first reading.
    pub fn update(&mut self, value: u64) -> Option<u64> {
        let value = value & mask(self.bits);
        let delta = self.previous.map(|previous| {
            let delta = wrapping_delta(previous, value, self.bits);
            if self.detect_reset && delta > mask(self.bits) / 2 {
                tracing::debug!("Counter reset from {} to {}", previous, value);
                0
            } else {
                delta
            }
        });
        self.previous = Some(value);
        delta
    }

    pub fn clear(&mut self) {
        self.previous = None;
    }
}

/// Speed in m/s from wheel revolutions over an interval in seconds.
pub fn wheel_speed(rev_delta: u64, seconds: f64, circumference_m: f64, calibration: f64) -> f64 {
    calibration * rev_delta as f64 * circumference_m / seconds
}

/// Cadence in rpm from crank revolutions over an interval in seconds.
pub fn crank_cadence(rev_delta: u64, seconds: f64) -> f64 {
    60.0 * rev_delta as f64 / seconds
}

/// Pace in s/m, absent when not moving.
pub fn pace_from_speed(speed: f64) -> Option<SensorValue> {
    if speed > 0.0 && speed.is_finite() {
        Some(SensorValue::Real(1.0 / speed))
    } else {
        None
    }
}

/// Push speed and pace samples derived from a speed in m/s.
pub fn push_speed(samples: &mut Vec<Sample>, speed: f64) {
    samples.push(Sample::Value(
        MeasurementKind::Speed,
        Some(SensorValue::Real(speed)),
    ));
    samples.push(Sample::Value(MeasurementKind::Pace, pace_from_speed(speed)));
}

/// Wheel revolution source: speed, pace and distance.
#[derive(Debug, Clone)]
pub struct WheelTracker {
    counter: RevolutionCounter,
    ticks_per_second: f64,
}

impl WheelTracker {
    pub fn new(rev_bits: u32, time_bits: u32, ticks_per_second: f64, stall_threshold: u32) -> Self {
        Self {
            counter: RevolutionCounter::new(rev_bits, time_bits, stall_threshold),
            ticks_per_second,
        }
    }

    pub fn update(&mut self, revolutions: u64, event_time: u64, ctx: &DecodeContext, samples: &mut Vec<Sample>) {
        match self.counter.update(revolutions, event_time) {
            CounterReading::First => {}
            CounterReading::Stalled { force_zero } => {
                if force_zero {
                    tracing::debug!("Wheel counter stalled, forcing speed to zero");
                    push_speed(samples, 0.0);
                }
            }
            CounterReading::Advanced {
                rev_delta,
                time_delta,
            } => {
                let seconds = time_delta as f64 / self.ticks_per_second;
                let speed = wheel_speed(
                    rev_delta,
                    seconds,
                    ctx.wheel_circumference_m,
                    ctx.calibration,
                );
                push_speed(samples, speed);

                let distance = ctx.calibration * rev_delta as f64 * ctx.wheel_circumference_m;
                samples.push(Sample::Delta(MeasurementKind::Distance, distance));
            }
        }
    }

    pub fn clear(&mut self) {
        self.counter.clear();
    }
}

/// Crank revolution source: cadence.
#[derive(Debug, Clone)]
pub struct CrankTracker {
    counter: RevolutionCounter,
    ticks_per_second: f64,
}

impl CrankTracker {
    pub fn new(rev_bits: u32, time_bits: u32, ticks_per_second: f64, stall_threshold: u32) -> Self {
        Self {
            counter: RevolutionCounter::new(rev_bits, time_bits, stall_threshold),
            ticks_per_second,
        }
    }

    pub fn update(&mut self, revolutions: u64, event_time: u64, samples: &mut Vec<Sample>) {
        match self.counter.update(revolutions, event_time) {
            CounterReading::First => {}
            CounterReading::Stalled { force_zero } => {
                if force_zero {
                    tracing::debug!("Crank counter stalled, forcing cadence to zero");
                    samples.push(Sample::Value(
                        MeasurementKind::Cadence,
                        Some(SensorValue::Real(0.0)),
                    ));
                }
            }
            CounterReading::Advanced {
                rev_delta,
                time_delta,
            } => {
                let seconds = time_delta as f64 / self.ticks_per_second;
                samples.push(Sample::Value(
                    MeasurementKind::Cadence,
                    Some(SensorValue::Real(crank_cadence(rev_delta, seconds))),
                ));
            }
        }
    }

    pub fn clear(&mut self) {
        self.counter.clear();
    }
}

/// Bounds-checked little-endian reader over a payload.
#[derive(Debug)]
pub struct PayloadReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.offset + n;
        if self.data.len() < end {
            return Err(DecodeError::TooShort {
                needed: end,
                actual: self.data.len(),
            });
        }
        let bytes = &self.data[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn i16(&mut self) -> Result<i16, DecodeError> {
        let b = self.take(2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn skip(&mut self, n: usize) -> Result<(), DecodeError> {
        self.take(n).map(|_| ())
    }
}

/// Builds a fresh decoder for one device given its stall threshold.
pub type DecoderFactory = fn(stall_threshold: u32) -> Box<dyn TelemetryDecoder>;

/// Startup-built lookup from (protocol, device kind) to decoder.
#[derive(Clone)]
pub struct DecoderTable {
    factories: HashMap<(Protocol, DeviceKind), DecoderFactory>,
}

impl DecoderTable {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Table with every decoder shipped by this crate.
    pub fn standard() -> Self {
        let mut table = Self::empty();
        crate::sensors::ble::register_decoders(&mut table);
        crate::sensors::ant::register_decoders(&mut table);
        table
    }

    pub fn register(&mut self, protocol: Protocol, device_kind: DeviceKind, factory: DecoderFactory) {
        self.factories.insert((protocol, device_kind), factory);
    }

    pub fn supports(&self, protocol: Protocol, device_kind: DeviceKind) -> bool {
        self.factories.contains_key(&(protocol, device_kind))
    }

    pub fn create(
        &self,
        protocol: Protocol,
        device_kind: DeviceKind,
        stall_threshold: u32,
    ) -> Result<Box<dyn TelemetryDecoder>, SensorError> {
        self.factories
            .get(&(protocol, device_kind))
            .map(|factory| factory(stall_threshold))
            .ok_or(SensorError::Unsupported(protocol, device_kind))
    }
}

impl Default for DecoderTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for DecoderTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self
            .factories
            .keys()
            .map(|(p, k)| format!("{}/{}", p, k))
            .collect();
        keys.sort();
        f.debug_struct("DecoderTable").field("decoders", &keys).finish()
    }
}
