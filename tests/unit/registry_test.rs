//! Unit tests for the sensor registry.
//!
//! Tests cover best-source selection, proxy handle lifetime and the
//! observer events emitted on registration changes.

use ridefusion::sensors::{
    DeviceId, DeviceKind, FusionEvent, MeasurementKind, PriorityTable, Sensor, SensorListener,
    SensorRegistry, SensorValue,
};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Recorder(Mutex<Vec<Option<SensorValue>>>);

impl SensorListener for Recorder {
    fn on_value(&self, _kind: MeasurementKind, value: Option<SensorValue>) {
        self.0.lock().unwrap().push(value);
    }
}

impl Recorder {
    fn last(&self) -> Option<Option<SensorValue>> {
        self.0.lock().unwrap().last().copied()
    }
}

fn speed_sensor(device: u32, device_kind: DeviceKind) -> Arc<Sensor> {
    Arc::new(Sensor::new(
        DeviceId(device),
        device_kind,
        MeasurementKind::Speed,
    ))
}

fn registry() -> SensorRegistry {
    SensorRegistry::with_priorities(PriorityTable::default())
}

#[test]
fn test_no_proxy_before_first_registration() {
    let registry = registry();
    assert!(registry.proxy(MeasurementKind::Speed).is_none());
    assert!(registry.available_kinds().is_empty());
}

#[test]
fn test_priority_beats_registration_order() {
    let registry = registry();
    let combined = speed_sensor(2, DeviceKind::SpeedAndCadence);
    let dedicated = speed_sensor(1, DeviceKind::SpeedOnly);

    registry.register(combined.clone()).unwrap();
    registry.register(dedicated.clone()).unwrap();

    let best = registry.best_sensor(MeasurementKind::Speed).unwrap();
    assert_eq!(best.device(), DeviceId(1));
}

#[test]
fn test_equal_priority_prefers_oldest() {
    let registry = registry();
    registry
        .register(speed_sensor(1, DeviceKind::SpeedOnly))
        .unwrap();
    registry
        .register(speed_sensor(2, DeviceKind::SpeedOnly))
        .unwrap();

    let best = registry.best_sensor(MeasurementKind::Speed).unwrap();
    assert_eq!(best.device(), DeviceId(1));
}

#[test]
fn test_proxy_follows_value_of_best_sensor() {
    let registry = registry();
    let sensor = speed_sensor(1, DeviceKind::SpeedOnly);
    registry.register(sensor.clone()).unwrap();

    let proxy = registry.proxy(MeasurementKind::Speed).unwrap();
    let recorder = Arc::new(Recorder::default());
    proxy.subscribe(recorder.clone());

    sensor.set_value(Some(SensorValue::Real(8.25))).unwrap();
    assert_eq!(proxy.value(), Some(SensorValue::Real(8.25)));
    assert_eq!(recorder.last(), Some(Some(SensorValue::Real(8.25))));
}

#[test]
fn test_non_best_updates_do_not_reach_subscribers() {
    let registry = registry();
    let best = speed_sensor(1, DeviceKind::SpeedOnly);
    let other = speed_sensor(2, DeviceKind::Gps);
    registry.register(best.clone()).unwrap();
    registry.register(other.clone()).unwrap();

    let recorder = Arc::new(Recorder::default());
    registry
        .proxy(MeasurementKind::Speed)
        .unwrap()
        .subscribe(recorder.clone());

    other.set_value(Some(SensorValue::Real(3.0))).unwrap();
    assert!(recorder.last().is_none());
}

#[test]
fn test_unregister_best_retargets_proxy() {
    let registry = registry();
    let dedicated = speed_sensor(1, DeviceKind::SpeedOnly);
    let combined = speed_sensor(2, DeviceKind::SpeedAndCadence);
    registry.register(combined.clone()).unwrap();
    registry.register(dedicated.clone()).unwrap();
    combined.set_value(Some(SensorValue::Real(5.0))).unwrap();

    let proxy = registry.proxy(MeasurementKind::Speed).unwrap();
    let recorder = Arc::new(Recorder::default());
    let id = proxy.subscribe(recorder.clone());

    assert!(registry.unregister(&dedicated));

    assert_eq!(proxy.current_sensor().unwrap().device(), DeviceId(2));
    assert_eq!(proxy.subscriber_ids(), vec![id]);
    // Subscribers hear about the new source immediately.
    assert_eq!(recorder.last(), Some(Some(SensorValue::Real(5.0))));

    combined.set_value(Some(SensorValue::Real(6.0))).unwrap();
    assert_eq!(recorder.last(), Some(Some(SensorValue::Real(6.0))));
}

#[test]
fn test_last_unregister_detaches_proxy() {
    let registry = registry();
    let sensor = speed_sensor(1, DeviceKind::SpeedOnly);
    registry.register(sensor.clone()).unwrap();
    let proxy = registry.proxy(MeasurementKind::Speed).unwrap();

    assert!(registry.unregister(&sensor));
    assert!(proxy.is_detached());
    assert!(proxy.value().is_none());
    assert!(registry.proxy(MeasurementKind::Speed).is_none());
    assert!(!registry.unregister(&sensor));
}

#[test]
fn test_registration_is_idempotent() {
    let registry = registry();
    let sensor = speed_sensor(1, DeviceKind::SpeedOnly);
    registry.register(sensor.clone()).unwrap();
    registry.register(sensor.clone()).unwrap();

    assert_eq!(registry.all_sensors().len(), 1);
    assert!(registry.unregister(&sensor));
    assert!(registry.proxy(MeasurementKind::Speed).is_none());
}

#[test]
fn test_all_but_best() {
    let registry = registry();
    registry
        .register(speed_sensor(1, DeviceKind::SpeedOnly))
        .unwrap();
    registry
        .register(speed_sensor(2, DeviceKind::FootPod))
        .unwrap();

    let rest = registry.all_but_best();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].device(), DeviceId(2));
}

#[test]
fn test_events_for_registration_lifecycle() {
    let registry = registry();
    let mut events = registry.subscribe_events();
    let sensor = speed_sensor(1, DeviceKind::SpeedOnly);

    registry.register(sensor.clone()).unwrap();
    registry.unregister(&sensor);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }

    assert!(seen.contains(&FusionEvent::KindAvailable(MeasurementKind::Speed)));
    assert!(seen.contains(&FusionEvent::BestChanged {
        kind: MeasurementKind::Speed,
        device: Some(DeviceId(1)),
    }));
    assert!(seen.contains(&FusionEvent::KindRemoved(MeasurementKind::Speed)));
}

#[test]
fn test_custom_priorities_respected() {
    let priorities =
        PriorityTable::empty().with(MeasurementKind::Speed, vec![DeviceKind::Gps, DeviceKind::SpeedOnly]);
    let registry = SensorRegistry::with_priorities(priorities);

    registry
        .register(speed_sensor(1, DeviceKind::SpeedOnly))
        .unwrap();
    registry.register(speed_sensor(2, DeviceKind::Gps)).unwrap();

    let best = registry.best_sensor(MeasurementKind::Speed).unwrap();
    assert_eq!(best.device_kind(), DeviceKind::Gps);
}
