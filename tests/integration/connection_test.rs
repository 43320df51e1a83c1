//! Integration tests for the per-device connection driver.
//!
//! Time is paused so search deadlines elapse instantly.

use crate::support::{heart_rate, wait_for};
use ridefusion::sensors::{
    ConnectionDriver, ConnectionState, DeviceId, DeviceKind, FusionContext, FusionEvent,
    MeasurementKind, Protocol, SensorValue, TransportEvent,
};
use ridefusion::FusionConfig;
use std::sync::Arc;
use std::time::Duration;

fn context() -> Arc<FusionContext> {
    Arc::new(FusionContext::new(FusionConfig::default()))
}

#[tokio::test(start_paused = true)]
async fn test_search_timeout_reports_not_found() {
    let context = context();
    let id = DeviceId(1);
    context
        .attach_device(id, Protocol::Ble, DeviceKind::HeartRateMonitor)
        .unwrap();
    let mut events = context.subscribe_events();

    let (tx, handle) = ConnectionDriver::spawn(context.clone(), id, Duration::from_secs(30));
    tx.send(TransportEvent::StartSearch).await.unwrap();

    let started = tokio::time::Instant::now();
    let event = wait_for(&mut events, |e| {
        matches!(e, FusionEvent::SearchFinished { .. })
    })
    .await;

    assert_eq!(
        event,
        FusionEvent::SearchFinished {
            device: id,
            found: false
        }
    );
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert_eq!(context.device(id).unwrap().state(), ConnectionState::Disconnected);

    drop(tx);
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_transport_found_does_not_stop_the_deadline() {
    let context = context();
    let id = DeviceId(1);
    context
        .attach_device(id, Protocol::Ble, DeviceKind::HeartRateMonitor)
        .unwrap();
    let mut events = context.subscribe_events();

    let (tx, handle) = ConnectionDriver::spawn(context.clone(), id, Duration::from_secs(10));
    tx.send(TransportEvent::StartSearch).await.unwrap();
    tx.send(TransportEvent::Found).await.unwrap();

    wait_for(&mut events, |e| {
        *e == FusionEvent::SearchFinished {
            device: id,
            found: false,
        }
    })
    .await;
    assert!(context.registry().available_kinds().is_empty());

    drop(tx);
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_service_ready_registers_and_lost_unregisters() {
    let context = context();
    let id = DeviceId(7);
    context
        .attach_device(id, Protocol::Ble, DeviceKind::HeartRateMonitor)
        .unwrap();
    let mut events = context.subscribe_events();

    let (tx, handle) = ConnectionDriver::spawn(context.clone(), id, Duration::from_secs(30));
    tx.send(TransportEvent::StartSearch).await.unwrap();
    tx.send(TransportEvent::Found).await.unwrap();
    tx.send(TransportEvent::ServiceReady).await.unwrap();

    wait_for(&mut events, |e| {
        *e == FusionEvent::SearchFinished {
            device: id,
            found: true,
        }
    })
    .await;
    assert!(context.proxy(MeasurementKind::HeartRate).is_some());

    tx.send(TransportEvent::Payload(heart_rate(142))).await.unwrap();
    tx.send(TransportEvent::Lost).await.unwrap();

    wait_for(&mut events, |e| {
        *e == FusionEvent::KindRemoved(MeasurementKind::HeartRate)
    })
    .await;
    assert!(context.value(MeasurementKind::HeartRate).is_none());
    assert_eq!(context.device(id).unwrap().state(), ConnectionState::Searching);

    // Searching again: the deadline applies once more.
    wait_for(&mut events, |e| {
        *e == FusionEvent::SearchFinished {
            device: id,
            found: false,
        }
    })
    .await;

    drop(tx);
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_payload_reaches_proxy_while_connected() {
    let context = context();
    let id = DeviceId(2);
    context
        .attach_device(id, Protocol::Ble, DeviceKind::HeartRateMonitor)
        .unwrap();
    let mut events = context.subscribe_events();

    let (tx, handle) = ConnectionDriver::spawn(context.clone(), id, Duration::from_secs(30));

    // Ignored: not connected yet.
    tx.send(TransportEvent::Payload(heart_rate(99))).await.unwrap();
    tx.send(TransportEvent::StartSearch).await.unwrap();
    tx.send(TransportEvent::ServiceReady).await.unwrap();
    tx.send(TransportEvent::Payload(heart_rate(131))).await.unwrap();
    tx.send(TransportEvent::Disconnect).await.unwrap();

    wait_for(&mut events, |e| {
        *e == FusionEvent::ConnectionChanged {
            device: id,
            state: ConnectionState::Disconnected,
        }
    })
    .await;

    let sensor = context.device(id).unwrap();
    let hr = sensor.sensor(MeasurementKind::HeartRate).unwrap();
    assert_eq!(hr.value(), Some(SensorValue::Integer(131)));
    assert!(context.proxy(MeasurementKind::HeartRate).is_none());

    drop(tx);
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_closed_channel_disconnects_device() {
    let context = context();
    let id = DeviceId(3);
    context
        .attach_device(id, Protocol::Ble, DeviceKind::SpeedOnly)
        .unwrap();

    let (tx, handle) = ConnectionDriver::spawn(context.clone(), id, Duration::from_secs(30));
    tx.send(TransportEvent::StartSearch).await.unwrap();
    tx.send(TransportEvent::ServiceReady).await.unwrap();
    drop(tx);
    handle.await.unwrap();

    assert_eq!(context.device(id).unwrap().state(), ConnectionState::Disconnected);
    assert!(context.registry().all_sensors().is_empty());
}
