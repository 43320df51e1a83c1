//! Observer notifications emitted by the fusion engine.

use crate::sensors::measurement::MeasurementKind;
use crate::sensors::types::{ConnectionState, DeviceId, DeviceKind};

/// Events broadcast to UI, summary and persistence collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum FusionEvent {
    /// A sensor became live
    SensorRegistered {
        device: DeviceId,
        device_kind: DeviceKind,
        kind: MeasurementKind,
    },
    /// A sensor went away
    SensorUnregistered {
        device: DeviceId,
        device_kind: DeviceKind,
        kind: MeasurementKind,
    },
    /// The first live sensor of a kind appeared
    KindAvailable(MeasurementKind),
    /// The last live sensor of a kind disappeared
    KindRemoved(MeasurementKind),
    /// The proxy handle of a kind now follows another device
    BestChanged {
        kind: MeasurementKind,
        device: Option<DeviceId>,
    },
    /// A device calibration factor was updated
    CalibrationChanged { device: DeviceId, factor: f64 },
    /// Device connection state changed
    ConnectionChanged {
        device: DeviceId,
        state: ConnectionState,
    },
    /// Searching ended, either with a connection or by timing out
    SearchFinished { device: DeviceId, found: bool },
}
