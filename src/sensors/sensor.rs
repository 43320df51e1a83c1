//! A single (device, measurement kind) value source.
//!
//! The latest committed value lives in an [`AtomicCell`] so that periodic
//! samplers read it without touching the locks producers and subscribers use.

use crossbeam::atomic::AtomicCell;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::sensors::measurement::MeasurementKind;
use crate::sensors::types::{DeviceId, DeviceKind, SensorError, SensorValue};

/// Receives value changes for one measurement kind.
pub trait SensorListener: Send + Sync {
    /// Called after a sensor committed a new value (`None` when absent).
    fn on_value(&self, kind: MeasurementKind, value: Option<SensorValue>);
}

/// Identity of a subscription, assigned by the proxy handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// A listener together with its subscription identity.
#[derive(Clone)]
pub struct Subscriber {
    pub id: ListenerId,
    pub listener: Arc<dyn SensorListener>,
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber").field("id", &self.id).finish()
    }
}

/// Unique identifier of a sensor instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SensorId(pub Uuid);

impl SensorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SensorId {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One measurement produced by one device.
pub struct Sensor {
    id: SensorId,
    device: DeviceId,
    device_kind: DeviceKind,
    kind: MeasurementKind,
    value: AtomicCell<Option<SensorValue>>,
    active: AtomicBool,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl Sensor {
    /// Create an active sensor with no reading yet.
    pub fn new(device: DeviceId, device_kind: DeviceKind, kind: MeasurementKind) -> Self {
        Self {
            id: SensorId::new(),
            device,
            device_kind,
            kind,
            value: AtomicCell::new(None),
            active: AtomicBool::new(true),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> SensorId {
        self.id
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn device_kind(&self) -> DeviceKind {
        self.device_kind
    }

    pub fn kind(&self) -> MeasurementKind {
        self.kind
    }

    /// Latest value, or `None` if there is no reading yet or the sensor is deactivated.
    pub fn value(&self) -> Option<SensorValue> {
        if !self.active.load(Ordering::Acquire) {
            return None;
        }
        self.value.load()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Replace the current reading of a non-accumulated sensor.
    ///
    /// Accumulated kinds only change through their [`AccumulatorCell`](crate::sensors::AccumulatorCell).
    pub fn set_value(&self, value: Option<SensorValue>) -> Result<(), SensorError> {
        if self.kind.is_accumulator() {
            return Err(SensorError::DirectAccumulatorWrite(self.kind));
        }
        self.publish(value);
        Ok(())
    }

    pub(crate) fn publish(&self, value: Option<SensorValue>) {
        self.commit(value);
        self.notify();
    }

    pub(crate) fn commit(&self, value: Option<SensorValue>) {
        self.value.store(value);
    }

    /// Report absent until [`activate`](Self::activate) is called.
    pub fn deactivate(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            self.notify();
        }
    }

    pub fn activate(&self) {
        if !self.active.swap(true, Ordering::AcqRel) {
            self.notify();
        }
    }

    /// Identities of the listeners currently attached.
    pub fn subscriber_ids(&self) -> Vec<ListenerId> {
        lock(&self.subscribers).iter().map(|s| s.id).collect()
    }

    pub(crate) fn subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        lock(&self.subscribers)
    }

    pub(crate) fn notify(&self) {
        // Snapshot so listeners run without the subscriber lock held.
        let subscribers: Vec<Subscriber> = lock(&self.subscribers).clone();
        if subscribers.is_empty() {
            return;
        }

        let value = self.value();
        for subscriber in subscribers {
            subscriber.listener.on_value(self.kind, value);
        }
    }
}

impl std::fmt::Debug for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sensor")
            .field("id", &self.id)
            .field("device", &self.device)
            .field("device_kind", &self.device_kind)
            .field("kind", &self.kind)
            .field("value", &self.value())
            .finish()
    }
}
