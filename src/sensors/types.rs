//! Sensor types and enums shared across the fusion engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sensors::measurement::MeasurementKind;

/// Class of physical source device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Heart rate strap or optical monitor
    HeartRateMonitor,
    /// Dedicated wheel speed sensor
    SpeedOnly,
    /// Dedicated crank cadence sensor
    CadenceOnly,
    /// Combined speed and cadence sensor
    SpeedAndCadence,
    /// Power meter (crank, pedal, hub)
    PowerMeter,
    /// Running foot pod / stride sensor
    FootPod,
    /// Satellite positioning receiver
    Gps,
    /// Network-derived location provider
    NetworkLocation,
    /// Platform fused location provider
    FusedLocation,
    /// Barometric altimeter
    BarometricAltitude,
}

impl DeviceKind {
    /// The measurement this class of device exists to provide.
    pub fn main_kind(&self) -> MeasurementKind {
        match self {
            DeviceKind::HeartRateMonitor => MeasurementKind::HeartRate,
            DeviceKind::SpeedOnly | DeviceKind::SpeedAndCadence => MeasurementKind::Speed,
            DeviceKind::CadenceOnly => MeasurementKind::Cadence,
            DeviceKind::PowerMeter => MeasurementKind::Power,
            DeviceKind::FootPod => MeasurementKind::Speed,
            DeviceKind::Gps | DeviceKind::NetworkLocation | DeviceKind::FusedLocation => {
                MeasurementKind::Latitude
            }
            DeviceKind::BarometricAltitude => MeasurementKind::Altitude,
        }
    }

    /// Measurements every device of this class reports. Their sensors go
    /// live as soon as the device connects.
    pub fn produces(&self) -> &'static [MeasurementKind] {
        use MeasurementKind::*;
        match self {
            DeviceKind::HeartRateMonitor => &[HeartRate],
            DeviceKind::SpeedOnly => &[Speed, Pace, Distance, LapDistance],
            DeviceKind::CadenceOnly => &[Cadence],
            DeviceKind::SpeedAndCadence => &[Speed, Pace, Cadence, Distance, LapDistance],
            DeviceKind::PowerMeter => &[Power],
            DeviceKind::FootPod => &[Speed, Pace, Distance, LapDistance],
            DeviceKind::Gps | DeviceKind::NetworkLocation | DeviceKind::FusedLocation => {
                &[Latitude, Longitude]
            }
            DeviceKind::BarometricAltitude => &[Altitude],
        }
    }

    /// Measurements only some devices of this class report. Their sensors
    /// go live once the first reading for the kind arrives.
    pub fn may_produce(&self) -> &'static [MeasurementKind] {
        use MeasurementKind::*;
        match self {
            DeviceKind::HeartRateMonitor => &[Calories],
            DeviceKind::PowerMeter => &[
                Cadence,
                Speed,
                Pace,
                Distance,
                LapDistance,
                PowerBalance,
                PedalSmoothness,
                TorqueEffectiveness,
                Calories,
            ],
            DeviceKind::FootPod => &[Cadence, Strides],
            DeviceKind::Gps => &[Altitude, Speed, Pace, Distance, LapDistance],
            _ => &[],
        }
    }

    /// Identical-timestamp samples tolerated before motion is reported as stopped.
    pub fn stall_threshold(&self) -> u32 {
        match self {
            DeviceKind::SpeedOnly
            | DeviceKind::CadenceOnly
            | DeviceKind::SpeedAndCadence
            | DeviceKind::PowerMeter => 4,
            DeviceKind::FootPod => 8,
            _ => 1,
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::HeartRateMonitor => write!(f, "Heart Rate"),
            DeviceKind::SpeedOnly => write!(f, "Speed"),
            DeviceKind::CadenceOnly => write!(f, "Cadence"),
            DeviceKind::SpeedAndCadence => write!(f, "Speed/Cadence"),
            DeviceKind::PowerMeter => write!(f, "Power Meter"),
            DeviceKind::FootPod => write!(f, "Foot Pod"),
            DeviceKind::Gps => write!(f, "GPS"),
            DeviceKind::NetworkLocation => write!(f, "Network Location"),
            DeviceKind::FusedLocation => write!(f, "Fused Location"),
            DeviceKind::BarometricAltitude => write!(f, "Barometer"),
        }
    }
}

/// Transport protocol a device speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Bluetooth Low Energy GATT profiles
    Ble,
    /// ANT+ device profiles
    AntPlus,
    /// Samples decoded by the platform before delivery
    Platform,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Ble => write!(f, "BLE"),
            Protocol::AntPlus => write!(f, "ANT+"),
            Protocol::Platform => write!(f, "Platform"),
        }
    }
}

/// Stable numeric identity of a connected device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single committed sensor value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorValue {
    Integer(i64),
    Real(f64),
}

impl SensorValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            SensorValue::Integer(v) => *v as f64,
            SensorValue::Real(v) => *v,
        }
    }
}

/// Connection state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected
    #[default]
    Disconnected,
    /// Looking for the device
    Searching,
    /// Link established, services not yet resolved
    ConnectedToTransport,
    /// Receiving measurement data
    ConnectedWithService,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Searching => write!(f, "Searching..."),
            ConnectionState::ConnectedToTransport => write!(f, "Connecting..."),
            ConnectionState::ConnectedWithService => write!(f, "Connected"),
        }
    }
}

/// Errors that can occur in the fusion engine.
#[derive(Debug, Error, PartialEq)]
pub enum SensorError {
    /// Kind is not tracked by this registry
    #[error("Measurement kind not tracked: {0}")]
    UnknownKind(MeasurementKind),

    /// Device not attached to the context
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceId),

    /// Device does not own a sensor of that kind
    #[error("Device {0} has no {1} sensor")]
    SensorNotFound(DeviceId, MeasurementKind),

    /// Device is already attached
    #[error("Device already attached: {0}")]
    AlreadyAttached(DeviceId),

    /// Seed rejected for the kind's domain
    #[error("Invalid seed {value} for {kind}")]
    InvalidSeed { kind: MeasurementKind, value: f64 },

    /// Calibration factor must be finite and positive
    #[error("Invalid calibration factor: {0}")]
    InvalidCalibration(f64),

    /// Operation requires an accumulator-backed kind
    #[error("{0} is not an accumulated measurement")]
    NotAccumulator(MeasurementKind),

    /// Accumulated values only change through seed/reset/increment
    #[error("{0} cannot be written directly")]
    DirectAccumulatorWrite(MeasurementKind),

    /// No decoder registered for the device
    #[error("No decoder for {0} {1}")]
    Unsupported(Protocol, DeviceKind),
}

/// Errors raised while decoding a wire payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload ended before a field announced by its flags
    #[error("Payload too short: needed {needed} bytes, got {actual}")]
    TooShort { needed: usize, actual: usize },

    /// Page number not handled by this profile
    #[error("Unexpected data page 0x{0:02X}")]
    UnexpectedPage(u8),

    /// Flags contradict the declared layout
    #[error("Inconsistent flags: {0}")]
    InconsistentFlags(String),
}
