//! Unit tests for counter arithmetic and the decoder table.

use ridefusion::sensors::telemetry::{
    pace_from_speed, wrapping_delta, CumulativeCounter, WheelTracker,
};
use ridefusion::sensors::{
    CounterReading, DecodeContext, DecoderTable, DeviceKind, MeasurementKind, Protocol,
    RevolutionCounter, Sample, SensorError, SensorValue,
};

#[test]
fn test_wrapping_delta_rollover() {
    assert_eq!(wrapping_delta(65530, 4, 16), 10);
    assert_eq!(wrapping_delta(250, 5, 8), 11);
    assert_eq!(wrapping_delta(10, 10, 16), 0);
}

#[test]
fn test_revolution_counter_rollover() {
    let mut counter = RevolutionCounter::new(16, 16, 4);
    assert_eq!(counter.update(65530, 1000), CounterReading::First);
    assert_eq!(
        counter.update(4, 2024),
        CounterReading::Advanced {
            rev_delta: 10,
            time_delta: 1024,
        }
    );
}

#[test]
fn test_revolution_counter_time_rollover() {
    let mut counter = RevolutionCounter::new(16, 16, 4);
    counter.update(100, 65000);
    let reading = counter.update(102, 488);
    assert_eq!(
        reading,
        CounterReading::Advanced {
            rev_delta: 2,
            time_delta: 1024,
        }
    );
}

#[test]
fn test_identical_timestamps_force_zero_at_threshold() {
    let mut counter = RevolutionCounter::new(16, 16, 3);
    counter.update(10, 100);

    assert_eq!(
        counter.update(10, 100),
        CounterReading::Stalled { force_zero: false }
    );
    assert_eq!(
        counter.update(10, 100),
        CounterReading::Stalled { force_zero: false }
    );
    assert_eq!(
        counter.update(10, 100),
        CounterReading::Stalled { force_zero: true }
    );
    assert_eq!(counter.identical_readings(), 3);

    // Motion again resets the run.
    assert!(matches!(
        counter.update(12, 1124),
        CounterReading::Advanced { rev_delta: 2, .. }
    ));
    assert_eq!(counter.identical_readings(), 0);
}

#[test]
fn test_cleared_counter_starts_over() {
    let mut counter = RevolutionCounter::new(16, 16, 4);
    counter.update(10, 100);
    counter.clear();
    assert_eq!(counter.update(5000, 9000), CounterReading::First);
}

#[test]
fn test_cumulative_counter() {
    let mut counter = CumulativeCounter::new(8);
    assert_eq!(counter.update(250), None);
    assert_eq!(counter.update(3), Some(9));
    counter.clear();
    assert_eq!(counter.update(40), None);
}

#[test]
fn test_wheel_tracker_speed_and_distance() {
    let ctx = DecodeContext::new(1.0, 2.0);
    let mut tracker = WheelTracker::new(32, 16, 1024.0, 4);
    let mut samples = Vec::new();

    tracker.update(1000, 0, &ctx, &mut samples);
    assert!(samples.is_empty());

    // 5 revolutions of 2 m in 2 s
    tracker.update(1005, 2048, &ctx, &mut samples);
    assert_eq!(
        samples,
        vec![
            Sample::Value(MeasurementKind::Speed, Some(SensorValue::Real(5.0))),
            Sample::Value(MeasurementKind::Pace, Some(SensorValue::Real(0.2))),
            Sample::Delta(MeasurementKind::Distance, 10.0),
        ]
    );
}

#[test]
fn test_pace_absent_when_stopped() {
    assert_eq!(pace_from_speed(0.0), None);
    assert_eq!(pace_from_speed(4.0), Some(SensorValue::Real(0.25)));
}

#[test]
fn test_standard_table_covers_wire_protocols() {
    let table = DecoderTable::standard();
    for kind in [
        DeviceKind::HeartRateMonitor,
        DeviceKind::SpeedOnly,
        DeviceKind::CadenceOnly,
        DeviceKind::SpeedAndCadence,
        DeviceKind::PowerMeter,
        DeviceKind::FootPod,
    ] {
        assert!(table.supports(Protocol::Ble, kind), "BLE {}", kind);
        assert!(table.supports(Protocol::AntPlus, kind), "ANT+ {}", kind);
    }
    assert!(!table.supports(Protocol::Ble, DeviceKind::Gps));
}

#[test]
fn test_create_unsupported_decoder() {
    let table = DecoderTable::empty();
    let result = table.create(Protocol::Ble, DeviceKind::HeartRateMonitor, 1);
    assert!(matches!(
        result,
        Err(SensorError::Unsupported(
            Protocol::Ble,
            DeviceKind::HeartRateMonitor
        ))
    ));
}
