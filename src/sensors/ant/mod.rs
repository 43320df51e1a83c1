//! ANT+ Protocol Support
//!
//! Decoders for the broadcast data pages of legacy ANT+ sensors. Every page is
//! eight bytes; the first byte carries the page number (bit 7 is the page
//! change toggle on some profiles).

pub mod profiles;

use crate::sensors::telemetry::{DecoderTable, TelemetryDecoder};
use crate::sensors::types::{DeviceKind, Protocol};

pub use profiles::hr::{AntHeartRateDecoder, HeartRateData};
pub use profiles::power::{AntPowerDecoder, PowerOnlyPage, TorqueEffectivenessPage};
pub use profiles::sdm::{SdmDecoder, StrideSpeedDistancePage};
pub use profiles::speed_cadence::{BikeSpeedCadenceDecoder, SpeedCadencePage};

/// ANT+ data page payload length
pub const PAGE_LEN: usize = 8;

/// ANT+ device types supported by this implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum AntDeviceType {
    /// Heart Rate Monitor (Device Type 120)
    HeartRate,
    /// Power Meter (Device Type 11)
    Power,
    /// Combined Speed/Cadence Sensor (Device Type 121)
    SpeedCadence,
    /// Cadence-only Sensor (Device Type 122)
    Cadence,
    /// Speed-only Sensor (Device Type 123)
    Speed,
    /// Stride Based Speed and Distance Monitor (Device Type 124)
    StrideSdm,
    /// Unknown device type
    Unknown(u8),
}

impl AntDeviceType {
    /// Get the ANT+ device type number
    pub fn device_type_number(&self) -> u8 {
        match self {
            AntDeviceType::HeartRate => 120,
            AntDeviceType::Power => 11,
            AntDeviceType::SpeedCadence => 121,
            AntDeviceType::Cadence => 122,
            AntDeviceType::Speed => 123,
            AntDeviceType::StrideSdm => 124,
            AntDeviceType::Unknown(n) => *n,
        }
    }

    /// Create from device type number
    pub fn from_number(n: u8) -> Self {
        match n {
            120 => AntDeviceType::HeartRate,
            11 => AntDeviceType::Power,
            121 => AntDeviceType::SpeedCadence,
            122 => AntDeviceType::Cadence,
            123 => AntDeviceType::Speed,
            124 => AntDeviceType::StrideSdm,
            _ => AntDeviceType::Unknown(n),
        }
    }

    /// The device class this ANT+ profile corresponds to.
    pub fn device_kind(&self) -> Option<DeviceKind> {
        match self {
            AntDeviceType::HeartRate => Some(DeviceKind::HeartRateMonitor),
            AntDeviceType::Power => Some(DeviceKind::PowerMeter),
            AntDeviceType::SpeedCadence => Some(DeviceKind::SpeedAndCadence),
            AntDeviceType::Cadence => Some(DeviceKind::CadenceOnly),
            AntDeviceType::Speed => Some(DeviceKind::SpeedOnly),
            AntDeviceType::StrideSdm => Some(DeviceKind::FootPod),
            AntDeviceType::Unknown(_) => None,
        }
    }
}

fn heart_rate(_stall_threshold: u32) -> Box<dyn TelemetryDecoder> {
    Box::new(AntHeartRateDecoder::new())
}

fn speed_cadence(stall_threshold: u32) -> Box<dyn TelemetryDecoder> {
    Box::new(BikeSpeedCadenceDecoder::new(
        AntDeviceType::SpeedCadence,
        stall_threshold,
    ))
}

fn speed(stall_threshold: u32) -> Box<dyn TelemetryDecoder> {
    Box::new(BikeSpeedCadenceDecoder::new(AntDeviceType::Speed, stall_threshold))
}

fn cadence(stall_threshold: u32) -> Box<dyn TelemetryDecoder> {
    Box::new(BikeSpeedCadenceDecoder::new(AntDeviceType::Cadence, stall_threshold))
}

fn power(stall_threshold: u32) -> Box<dyn TelemetryDecoder> {
    Box::new(AntPowerDecoder::new(stall_threshold))
}

fn stride(stall_threshold: u32) -> Box<dyn TelemetryDecoder> {
    Box::new(SdmDecoder::new(stall_threshold))
}

pub(crate) fn register_decoders(table: &mut DecoderTable) {
    table.register(Protocol::AntPlus, DeviceKind::HeartRateMonitor, heart_rate);
    table.register(Protocol::AntPlus, DeviceKind::SpeedAndCadence, speed_cadence);
    table.register(Protocol::AntPlus, DeviceKind::SpeedOnly, speed);
    table.register(Protocol::AntPlus, DeviceKind::CadenceOnly, cadence);
    table.register(Protocol::AntPlus, DeviceKind::PowerMeter, power);
    table.register(Protocol::AntPlus, DeviceKind::FootPod, stride);
}
