//! RideFusion - Sensor Fusion Engine for Activity Tracking
//!
//! Aggregates readings from redundant, independently connecting sensors
//! (speed, cadence, heart rate, power, location, altitude) into one coherent
//! value stream per measurement kind. Decodes BLE and ANT+ payloads, selects
//! the best live source by priority and keeps cumulative totals continuous
//! across device churn, laps and session resumption.

pub mod sensors;
pub mod storage;

// Re-export commonly used types
pub use sensors::context::FusionContext;
pub use sensors::measurement::MeasurementKind;
pub use sensors::registry::{PriorityTable, SensorRegistry};
pub use storage::config::FusionConfig;
