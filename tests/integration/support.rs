//! Shared helpers for integration tests.

use ridefusion::sensors::{FusionEvent, MeasurementKind, SensorListener, SensorValue};
use std::sync::Mutex;
use tokio::sync::broadcast;

/// BLE CSC Measurement payload with wheel data only.
pub fn csc_wheel(revs: u32, time: u16) -> Vec<u8> {
    let mut data = vec![0x01];
    data.extend_from_slice(&revs.to_le_bytes());
    data.extend_from_slice(&time.to_le_bytes());
    data
}

/// BLE Heart Rate Measurement payload with a u8 heart rate.
pub fn heart_rate(bpm: u8) -> Vec<u8> {
    vec![0x00, bpm]
}

/// Records every value a subscription receives.
#[derive(Default)]
pub struct Recorder(Mutex<Vec<Option<SensorValue>>>);

impl SensorListener for Recorder {
    fn on_value(&self, _kind: MeasurementKind, value: Option<SensorValue>) {
        self.0.lock().unwrap().push(value);
    }
}

impl Recorder {
    pub fn values(&self) -> Vec<Option<SensorValue>> {
        self.0.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Option<SensorValue>> {
        self.values().last().copied()
    }
}

/// Wait for the first event matching `pred`.
pub async fn wait_for(
    events: &mut broadcast::Receiver<FusionEvent>,
    pred: impl Fn(&FusionEvent) -> bool,
) -> FusionEvent {
    loop {
        match events.recv().await {
            Ok(event) if pred(&event) => return event,
            Ok(_) => continue,
            Err(e) => panic!("event channel failed: {e}"),
        }
    }
}

pub fn real(value: Option<SensorValue>) -> f64 {
    value.map(|v| v.as_f64()).unwrap_or(f64::NAN)
}
