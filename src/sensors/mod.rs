//! Sensor fusion engine for BLE, ANT+ and platform-decoded devices.

pub mod accumulator;
pub mod ant;
pub mod ble;
pub mod connection;
pub mod context;
pub mod device;
pub mod events;
pub mod filter;
pub mod measurement;
pub mod proxy;
pub mod registry;
pub mod sensor;
pub mod telemetry;
pub mod types;

pub use accumulator::{AccumulatorCell, SessionPause};
pub use connection::{
    ConnectionAction, ConnectionDriver, ConnectionEvent, ConnectionStateMachine, TransportEvent,
};
pub use context::{FusionContext, SessionSnapshot};
pub use device::{DeviceHandle, DeviceSettings};
pub use events::FusionEvent;
pub use filter::{FilterDecision, ThresholdFilter};
pub use measurement::{MeasurementKind, Representation};
pub use proxy::ProxyHandle;
pub use registry::{PriorityTable, SensorRegistry, SensorSnapshot};
pub use sensor::{ListenerId, Sensor, SensorId, SensorListener};
pub use telemetry::{
    CounterReading, DecodeContext, DecoderTable, RevolutionCounter, Sample, TelemetryDecoder,
};
pub use types::{
    ConnectionState, DecodeError, DeviceId, DeviceKind, Protocol, SensorError, SensorValue,
};
