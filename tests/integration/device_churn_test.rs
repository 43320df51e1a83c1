//! Integration tests for best-source churn.
//!
//! A combined speed/cadence sensor and a dedicated speed sensor come and go
//! while a consumer stays subscribed to the speed handle.

use crate::support::{csc_wheel, real, Recorder};
use ridefusion::sensors::{
    DeviceId, DeviceKind, FusionContext, FusionEvent, MeasurementKind, Protocol, SensorValue,
};
use ridefusion::FusionConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

const DEDICATED: DeviceId = DeviceId(1);
const COMBINED: DeviceId = DeviceId(2);

fn context() -> FusionContext {
    let config = FusionConfig {
        wheel_circumference_mm: 2000,
        ..FusionConfig::default()
    };
    let context = FusionContext::new(config);
    context
        .attach_device(DEDICATED, Protocol::Ble, DeviceKind::SpeedOnly)
        .unwrap();
    context
        .attach_device(COMBINED, Protocol::Ble, DeviceKind::SpeedAndCadence)
        .unwrap();
    context
}

/// Two payloads one second apart: `revs` wheel revolutions.
fn ride(context: &FusionContext, id: DeviceId, start: u32, revs: u32, time: u16) {
    context.ingest(id, &csc_wheel(start, time)).unwrap();
    context
        .ingest(id, &csc_wheel(start + revs, time.wrapping_add(1024)))
        .unwrap();
}

#[test]
fn test_dedicated_sensor_takes_over_and_hands_back() {
    let context = context();
    context.connect(COMBINED).unwrap();
    ride(&context, COMBINED, 0, 3, 0);

    let proxy = context.proxy(MeasurementKind::Speed).unwrap();
    let recorder = Arc::new(Recorder::default());
    let id = proxy.subscribe(recorder.clone());
    assert_eq!(proxy.value(), Some(SensorValue::Real(6.0)));

    context.connect(DEDICATED).unwrap();
    assert_eq!(
        context.best_sensor(MeasurementKind::Speed).unwrap().device(),
        DEDICATED
    );
    // No reading from the new source yet.
    assert_eq!(recorder.last(), Some(None));

    ride(&context, DEDICATED, 100, 4, 0);
    assert_eq!(recorder.last(), Some(Some(SensorValue::Real(8.0))));

    // Combined sensor updates are not forwarded while it is not best.
    let before = recorder.values().len();
    ride(&context, COMBINED, 3, 1, 1024);
    assert_eq!(recorder.values().len(), before);

    context.disconnect(DEDICATED).unwrap();

    let same = context.proxy(MeasurementKind::Speed).unwrap();
    assert!(Arc::ptr_eq(&proxy, &same));
    assert_eq!(proxy.subscriber_ids(), vec![id]);
    assert_eq!(
        proxy.current_sensor().unwrap().device(),
        COMBINED
    );
    assert_eq!(recorder.last(), Some(Some(SensorValue::Real(2.0))));
}

#[test]
fn test_best_changed_events_follow_churn() {
    let context = context();
    let mut events = context.subscribe_events();

    context.connect(COMBINED).unwrap();
    context.connect(DEDICATED).unwrap();
    context.disconnect(DEDICATED).unwrap();

    let mut best = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let FusionEvent::BestChanged {
            kind: MeasurementKind::Speed,
            device,
        } = event
        {
            best.push(device);
        }
    }
    assert_eq!(best, vec![Some(COMBINED), Some(DEDICATED), Some(COMBINED)]);
}

#[test]
fn test_cadence_stays_on_combined_sensor() {
    let context = context();
    context.connect(COMBINED).unwrap();
    context.connect(DEDICATED).unwrap();

    assert_eq!(
        context.best_sensor(MeasurementKind::Cadence).unwrap().device(),
        COMBINED
    );
    assert!(context
        .registry()
        .all_but_best()
        .iter()
        .all(|s| s.device() == COMBINED));
}

#[test]
fn test_distance_switches_source_without_compensation() {
    let context = context();
    context.connect(COMBINED).unwrap();
    context.connect(DEDICATED).unwrap();

    ride(&context, COMBINED, 0, 50, 0);
    ride(&context, DEDICATED, 0, 5, 0);
    assert_eq!(real(context.value(MeasurementKind::Distance)), 10.0);

    context.disconnect(DEDICATED).unwrap();
    assert_eq!(real(context.value(MeasurementKind::Distance)), 100.0);

    // Reconnecting resumes the dedicated sensor's own total.
    context.connect(DEDICATED).unwrap();
    assert_eq!(real(context.value(MeasurementKind::Distance)), 10.0);
}

#[test]
fn test_last_source_leaving_removes_kind() {
    let context = context();
    let mut events = context.subscribe_events();
    context.connect(DEDICATED).unwrap();
    let proxy = context.proxy(MeasurementKind::Speed).unwrap();

    context.disconnect(DEDICATED).unwrap();
    assert!(proxy.is_detached());

    let removed: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|e| matches!(e, FusionEvent::KindRemoved(_)))
        .collect();
    assert!(removed.contains(&FusionEvent::KindRemoved(MeasurementKind::Speed)));
    assert!(removed.contains(&FusionEvent::KindRemoved(MeasurementKind::LapDistance)));
}

#[test]
fn test_reconnect_starts_deltas_fresh() {
    let context = context();
    context.connect(DEDICATED).unwrap();
    ride(&context, DEDICATED, 0, 5, 0);
    assert_eq!(real(context.value(MeasurementKind::Distance)), 10.0);

    context.disconnect(DEDICATED).unwrap();
    // Stale payload queued behind the disconnect.
    assert_eq!(context.ingest(DEDICATED, &csc_wheel(500, 4096)).unwrap(), 0);

    context.connect(DEDICATED).unwrap();
    context.ingest(DEDICATED, &csc_wheel(501, 5120)).unwrap();
    assert_eq!(real(context.value(MeasurementKind::Distance)), 10.0);

    context.ingest(DEDICATED, &csc_wheel(502, 6144)).unwrap();
    assert_eq!(real(context.value(MeasurementKind::Distance)), 12.0);
}

#[test]
fn test_parallel_churn_keeps_registry_consistent() {
    const CHURNERS: u32 = 4;
    const CYCLES: u32 = 300;

    let context = Arc::new(context());
    context.connect(COMBINED).unwrap();
    ride(&context, COMBINED, 0, 3, 0);
    for n in 0..CHURNERS {
        context
            .attach_device(DeviceId(10 + n), Protocol::Ble, DeviceKind::SpeedOnly)
            .unwrap();
    }

    let proxy = context.proxy(MeasurementKind::Speed).unwrap();
    let recorder = Arc::new(Recorder::default());
    let id = proxy.subscribe(recorder.clone());

    let barrier = Arc::new(Barrier::new(2 * CHURNERS as usize + 1));
    let done = Arc::new(AtomicBool::new(false));
    let mut churners = Vec::new();

    for n in 0..CHURNERS {
        let device = DeviceId(10 + n);

        let (ctx, start) = (context.clone(), barrier.clone());
        churners.push(thread::spawn(move || {
            start.wait();
            for _ in 0..CYCLES {
                ctx.connect(device).unwrap();
                ctx.disconnect(device).unwrap();
                // Unregistering twice is harmless.
                ctx.unregister_device(device).unwrap();
            }
        }));

        let (ctx, start) = (context.clone(), barrier.clone());
        churners.push(thread::spawn(move || {
            start.wait();
            for i in 0..CYCLES {
                let time = (i as u16).wrapping_mul(1024);
                ctx.ingest(device, &csc_wheel(i * 2, time)).unwrap();
            }
        }));
    }

    let reader = {
        let (proxy, start, done) = (proxy.clone(), barrier.clone(), done.clone());
        thread::spawn(move || {
            start.wait();
            let mut reads = 0u64;
            while !done.load(Ordering::SeqCst) {
                let _ = proxy.value();
                assert!(!proxy.is_detached());
                reads += 1;
            }
            reads
        })
    };

    for handle in churners {
        handle.join().unwrap();
    }
    done.store(true, Ordering::SeqCst);
    assert!(reader.join().unwrap() > 0);

    assert_eq!(proxy.subscriber_ids(), vec![id]);
    assert_eq!(proxy.current_sensor().unwrap().device(), COMBINED);
    assert!(context
        .registry()
        .all_sensors()
        .iter()
        .all(|s| s.device() == COMBINED));

    context.disconnect(COMBINED).unwrap();
    assert!(context.registry().all_sensors().is_empty());
    assert!(context.proxy(MeasurementKind::Speed).is_none());
    assert!(proxy.is_detached());
}
