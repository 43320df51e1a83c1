//! Integration tests for session-level accumulation.
//!
//! Tests cover resumed totals, laps, pause handling and calibration through
//! the public context API.

use crate::support::{csc_wheel, real};
use ridefusion::sensors::{
    DeviceId, DeviceKind, FusionContext, FusionEvent, MeasurementKind, Protocol, Sample,
    SensorError, SensorValue,
};
use ridefusion::FusionConfig;

const WHEEL: DeviceId = DeviceId(1);

/// Context with a connected BLE speed sensor on a 2 m wheel.
fn riding_context() -> FusionContext {
    let config = FusionConfig {
        wheel_circumference_mm: 2000,
        ..FusionConfig::default()
    };
    let context = FusionContext::new(config);
    context
        .attach_device(WHEEL, Protocol::Ble, DeviceKind::SpeedOnly)
        .unwrap();
    context.connect(WHEEL).unwrap();
    context
}

#[test]
fn test_resumed_distance_continues_from_seed() {
    let context = riding_context();
    context.seed(WHEEL, MeasurementKind::Distance, 1000.0).unwrap();

    context.ingest(WHEEL, &csc_wheel(50, 0)).unwrap();
    context.ingest(WHEEL, &csc_wheel(55, 2048)).unwrap();

    assert_eq!(real(context.value(MeasurementKind::Distance)), 1010.0);
    assert_eq!(
        context.value(MeasurementKind::Speed),
        Some(SensorValue::Real(5.0))
    );
}

#[test]
fn test_lap_restarts_lap_distance_only() {
    let context = riding_context();
    context.ingest(WHEEL, &csc_wheel(0, 0)).unwrap();
    context.ingest(WHEEL, &csc_wheel(10, 1024)).unwrap();

    context.lap();
    assert_eq!(real(context.value(MeasurementKind::LapDistance)), 0.0);
    assert_eq!(real(context.value(MeasurementKind::Distance)), 20.0);

    context.ingest(WHEEL, &csc_wheel(13, 2048)).unwrap();
    assert_eq!(real(context.value(MeasurementKind::LapDistance)), 6.0);
    assert_eq!(real(context.value(MeasurementKind::Distance)), 26.0);
}

#[test]
fn test_paused_session_holds_totals() {
    let context = riding_context();
    context.ingest(WHEEL, &csc_wheel(0, 0)).unwrap();
    context.ingest(WHEEL, &csc_wheel(5, 1024)).unwrap();

    context.pause();
    assert!(context.is_paused());
    context.ingest(WHEEL, &csc_wheel(10, 2048)).unwrap();
    assert_eq!(real(context.value(MeasurementKind::Distance)), 10.0);
    // Instantaneous values keep flowing.
    assert_eq!(
        context.value(MeasurementKind::Speed),
        Some(SensorValue::Real(10.0))
    );

    context.resume();
    context.ingest(WHEEL, &csc_wheel(11, 3072)).unwrap();
    assert_eq!(real(context.value(MeasurementKind::Distance)), 12.0);
}

#[test]
fn test_calibration_scales_subsequent_payloads() {
    let context = riding_context();
    let mut events = context.subscribe_events();

    context.update_calibration(WHEEL, 1.5).unwrap();
    assert_eq!(
        events.try_recv().unwrap(),
        FusionEvent::CalibrationChanged {
            device: WHEEL,
            factor: 1.5
        }
    );

    context.ingest(WHEEL, &csc_wheel(0, 0)).unwrap();
    context.ingest(WHEEL, &csc_wheel(2, 1024)).unwrap();
    assert_eq!(real(context.value(MeasurementKind::Distance)), 6.0);

    assert_eq!(
        context.update_calibration(WHEEL, 0.0),
        Err(SensorError::InvalidCalibration(0.0))
    );
}

#[test]
fn test_seed_rejected_for_instantaneous_kind() {
    let context = riding_context();
    assert_eq!(
        context.seed(WHEEL, MeasurementKind::Speed, 3.0),
        Err(SensorError::NotAccumulator(MeasurementKind::Speed))
    );
}

#[test]
fn test_malformed_payload_keeps_values() {
    let context = riding_context();
    context.ingest(WHEEL, &csc_wheel(0, 0)).unwrap();
    context.ingest(WHEEL, &csc_wheel(1, 1024)).unwrap();

    assert_eq!(context.ingest(WHEEL, &[0x01, 0x02]).unwrap(), 0);
    assert_eq!(
        context.value(MeasurementKind::Speed),
        Some(SensorValue::Real(2.0))
    );
}

#[test]
fn test_platform_location_samples() {
    let context = FusionContext::new(FusionConfig::default());
    let gps = DeviceId(9);
    context
        .attach_device(gps, Protocol::Platform, DeviceKind::Gps)
        .unwrap();

    // Not connected yet.
    let sample = Sample::Value(MeasurementKind::Latitude, Some(SensorValue::Real(51.5)));
    assert!(!context.submit_sample(gps, sample).unwrap());

    context.connect(gps).unwrap();
    assert!(context.submit_sample(gps, sample).unwrap());
    assert!(context
        .submit_sample(
            gps,
            Sample::Value(MeasurementKind::Altitude, Some(SensorValue::Real(-3.5)))
        )
        .unwrap());

    assert_eq!(
        context.value(MeasurementKind::Latitude),
        Some(SensorValue::Real(51.5))
    );
    assert_eq!(
        context.value(MeasurementKind::Altitude),
        Some(SensorValue::Real(-3.5))
    );
}

#[test]
fn test_snapshot_lists_best_values() {
    let context = riding_context();
    context.ingest(WHEEL, &csc_wheel(0, 0)).unwrap();
    context.ingest(WHEEL, &csc_wheel(4, 2048)).unwrap();

    let snapshot = context.snapshot();
    assert!(!snapshot.paused);
    assert_eq!(
        snapshot.values.get(&MeasurementKind::Speed),
        Some(&SensorValue::Real(4.0))
    );
    assert!(snapshot
        .sensors
        .iter()
        .all(|s| s.device == WHEEL && s.is_best));

    let json = serde_json::to_string(&snapshot).unwrap();
    assert!(json.contains("\"lap_distance\""));
}

#[test]
fn test_teardown_releases_everything() {
    let context = riding_context();
    let proxy = context.proxy(MeasurementKind::Speed).unwrap();

    context.teardown();
    assert!(proxy.is_detached());
    assert!(context.devices().is_empty());
    assert!(context.registry().available_kinds().is_empty());
}

#[test]
fn test_wheelless_power_meter_leaves_gps_speed_live() {
    let context = FusionContext::new(FusionConfig::default());
    let gps = DeviceId(9);
    let meter = DeviceId(4);
    context
        .attach_device(gps, Protocol::Platform, DeviceKind::Gps)
        .unwrap();
    context.connect(gps).unwrap();
    context
        .submit_sample(
            gps,
            Sample::Value(MeasurementKind::Speed, Some(SensorValue::Real(5.0))),
        )
        .unwrap();

    context
        .attach_device(meter, Protocol::Ble, DeviceKind::PowerMeter)
        .unwrap();
    context.connect(meter).unwrap();
    // Flags 0: instantaneous power only, 250 W
    assert!(context.ingest(meter, &[0x00, 0x00, 0xFA, 0x00]).unwrap() > 0);

    assert_eq!(real(context.value(MeasurementKind::Power)), 250.0);
    assert_eq!(
        context.value(MeasurementKind::Speed),
        Some(SensorValue::Real(5.0))
    );
    assert_eq!(
        context.best_sensor(MeasurementKind::Speed).unwrap().device(),
        gps
    );

    let meter_kinds: Vec<_> = context
        .registry()
        .all_sensors()
        .iter()
        .filter(|s| s.device() == meter)
        .map(|s| s.kind())
        .collect();
    assert_eq!(meter_kinds, vec![MeasurementKind::Power]);
}

#[test]
fn test_gps_distance_accumulates_and_laps() {
    let context = FusionContext::new(FusionConfig::default());
    let gps = DeviceId(9);
    context
        .attach_device(gps, Protocol::Platform, DeviceKind::Gps)
        .unwrap();
    context.connect(gps).unwrap();
    assert!(context.value(MeasurementKind::Distance).is_none());

    assert!(context
        .submit_sample(gps, Sample::Delta(MeasurementKind::Distance, 12.0))
        .unwrap());
    assert_eq!(real(context.value(MeasurementKind::Distance)), 12.0);
    assert_eq!(real(context.value(MeasurementKind::LapDistance)), 12.0);

    context.lap();
    assert_eq!(real(context.value(MeasurementKind::LapDistance)), 0.0);

    context
        .submit_sample(gps, Sample::Delta(MeasurementKind::Distance, 3.0))
        .unwrap();
    assert_eq!(real(context.value(MeasurementKind::LapDistance)), 3.0);
    assert_eq!(real(context.value(MeasurementKind::Distance)), 15.0);
}

#[test]
fn test_platform_values_take_kind_representation() {
    let context = FusionContext::new(FusionConfig::default());
    let gps = DeviceId(9);
    let strap = DeviceId(5);
    context
        .attach_device(gps, Protocol::Platform, DeviceKind::Gps)
        .unwrap();
    context
        .attach_device(strap, Protocol::Platform, DeviceKind::HeartRateMonitor)
        .unwrap();
    context.connect(gps).unwrap();
    context.connect(strap).unwrap();

    context
        .submit_sample(
            gps,
            Sample::Value(MeasurementKind::Speed, Some(SensorValue::Integer(3))),
        )
        .unwrap();
    context
        .submit_sample(
            strap,
            Sample::Value(MeasurementKind::HeartRate, Some(SensorValue::Real(71.6))),
        )
        .unwrap();

    assert_eq!(
        context.value(MeasurementKind::Speed),
        Some(SensorValue::Real(3.0))
    );
    assert_eq!(
        context.value(MeasurementKind::HeartRate),
        Some(SensorValue::Integer(72))
    );
}
