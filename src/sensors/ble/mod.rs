//! Bluetooth Low Energy GATT profile decoders.
//!
//! Each characteristic payload starts with a flags field followed by
//! little-endian fixed-width fields whose presence the flags announce.

pub mod csc;
pub mod heart_rate;
pub mod power;
pub mod rsc;

pub use csc::{CscDecoder, CscMeasurement};
pub use heart_rate::{HeartRateDecoder, HeartRateMeasurement};
pub use power::{CyclingPowerDecoder, CyclingPowerMeasurement};
pub use rsc::{RscDecoder, RscMeasurement};

use crate::sensors::telemetry::{DecoderTable, TelemetryDecoder};
use crate::sensors::types::{DeviceKind, Protocol};

/// Heart Rate Measurement characteristic
pub const HEART_RATE_MEASUREMENT: u16 = 0x2A37;
/// CSC Measurement characteristic
pub const CSC_MEASUREMENT: u16 = 0x2A5B;
/// Cycling Power Measurement characteristic
pub const CYCLING_POWER_MEASUREMENT: u16 = 0x2A63;
/// RSC Measurement characteristic
pub const RSC_MEASUREMENT: u16 = 0x2A53;

/// Characteristic a device of `kind` notifies measurements on.
pub fn measurement_characteristic(kind: DeviceKind) -> Option<u16> {
    match kind {
        DeviceKind::HeartRateMonitor => Some(HEART_RATE_MEASUREMENT),
        DeviceKind::SpeedOnly | DeviceKind::CadenceOnly | DeviceKind::SpeedAndCadence => {
            Some(CSC_MEASUREMENT)
        }
        DeviceKind::PowerMeter => Some(CYCLING_POWER_MEASUREMENT),
        DeviceKind::FootPod => Some(RSC_MEASUREMENT),
        _ => None,
    }
}

fn heart_rate(_stall_threshold: u32) -> Box<dyn TelemetryDecoder> {
    Box::new(HeartRateDecoder::new())
}

fn csc(stall_threshold: u32) -> Box<dyn TelemetryDecoder> {
    Box::new(CscDecoder::new(stall_threshold))
}

fn cycling_power(stall_threshold: u32) -> Box<dyn TelemetryDecoder> {
    Box::new(CyclingPowerDecoder::new(stall_threshold))
}

fn rsc(_stall_threshold: u32) -> Box<dyn TelemetryDecoder> {
    Box::new(RscDecoder::new())
}

pub(crate) fn register_decoders(table: &mut DecoderTable) {
    table.register(Protocol::Ble, DeviceKind::HeartRateMonitor, heart_rate);
    table.register(Protocol::Ble, DeviceKind::SpeedOnly, csc);
    table.register(Protocol::Ble, DeviceKind::CadenceOnly, csc);
    table.register(Protocol::Ble, DeviceKind::SpeedAndCadence, csc);
    table.register(Protocol::Ble, DeviceKind::PowerMeter, cycling_power);
    table.register(Protocol::Ble, DeviceKind::FootPod, rsc);
}
