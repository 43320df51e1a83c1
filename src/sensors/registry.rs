//! Central index of live sensors and best-source selection.
//!
//! Sensors are bucketed per (measurement kind, device kind). Each measurement
//! kind has its own slot lock covering the buckets and the proxy retarget; the
//! lock is released before any listener or observer is notified.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use crate::sensors::events::FusionEvent;
use crate::sensors::measurement::MeasurementKind;
use crate::sensors::proxy::{ProxyHandle, Retarget};
use crate::sensors::sensor::{lock, Sensor, SensorId};
use crate::sensors::types::{DeviceId, DeviceKind, SensorError, SensorValue};

/// Preferred device kinds per measurement kind, highest priority first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriorityTable(BTreeMap<MeasurementKind, Vec<DeviceKind>>);

impl PriorityTable {
    /// A table with no entries; every kind falls back to insertion order.
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, kind: MeasurementKind, order: Vec<DeviceKind>) -> Self {
        self.0.insert(kind, order);
        self
    }

    pub fn get(&self, kind: MeasurementKind) -> Option<&[DeviceKind]> {
        self.0.get(&kind).map(Vec::as_slice)
    }
}

impl Default for PriorityTable {
    fn default() -> Self {
        use DeviceKind::*;
        use MeasurementKind as M;

        let speed = vec![SpeedOnly, SpeedAndCadence, PowerMeter, FootPod, Gps];
        let location = vec![Gps, FusedLocation, NetworkLocation];

        Self::empty()
            .with(M::Speed, speed.clone())
            .with(M::Pace, speed.clone())
            .with(M::Distance, speed.clone())
            .with(M::LapDistance, speed)
            .with(
                M::Cadence,
                vec![CadenceOnly, SpeedAndCadence, PowerMeter, FootPod],
            )
            .with(M::HeartRate, vec![HeartRateMonitor])
            .with(M::Power, vec![PowerMeter])
            .with(M::Altitude, vec![BarometricAltitude, Gps])
            .with(M::Latitude, location.clone())
            .with(M::Longitude, location)
    }
}

/// Enumeration entry handed to the persistence/sampling collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub sensor_id: SensorId,
    pub device: DeviceId,
    pub device_kind: DeviceKind,
    pub kind: MeasurementKind,
    pub value: Option<SensorValue>,
    pub is_best: bool,
}

#[derive(Debug)]
struct Bucket {
    device_kind: DeviceKind,
    sensors: VecDeque<Arc<Sensor>>,
}

#[derive(Debug, Default)]
struct KindSlot {
    /// In order of first insertion
    buckets: Vec<Bucket>,
    proxy: Option<Arc<ProxyHandle>>,
}

impl KindSlot {
    fn contains(&self, id: SensorId) -> bool {
        self.buckets
            .iter()
            .any(|b| b.sensors.iter().any(|s| s.id() == id))
    }

    fn is_empty(&self) -> bool {
        self.buckets.iter().all(|b| b.sensors.is_empty())
    }

    fn best(&self, order: Option<&[DeviceKind]>) -> Option<Arc<Sensor>> {
        if let Some(order) = order {
            for device_kind in order {
                let front = self
                    .buckets
                    .iter()
                    .find(|b| b.device_kind == *device_kind)
                    .and_then(|b| b.sensors.front());
                if let Some(sensor) = front {
                    return Some(sensor.clone());
                }
            }
        }

        // Unlisted device kinds, in insertion order.
        self.buckets
            .iter()
            .filter(|b| order.map_or(true, |o| !o.contains(&b.device_kind)))
            .find_map(|b| b.sensors.front().cloned())
    }
}

/// Index of all live sensors of a session.
pub struct SensorRegistry {
    priorities: PriorityTable,
    slots: HashMap<MeasurementKind, Mutex<KindSlot>>,
    events: broadcast::Sender<FusionEvent>,
}

impl SensorRegistry {
    /// Create a registry tracking `kinds`, publishing to `events`.
    pub fn new(
        priorities: PriorityTable,
        kinds: &[MeasurementKind],
        events: broadcast::Sender<FusionEvent>,
    ) -> Self {
        let slots = kinds
            .iter()
            .map(|kind| (*kind, Mutex::new(KindSlot::default())))
            .collect();

        tracing::info!("Sensor registry created for {} kinds", kinds.len());

        Self {
            priorities,
            slots,
            events,
        }
    }

    /// Registry tracking every kind with its own event channel.
    pub fn with_priorities(priorities: PriorityTable) -> Self {
        let (events, _) = broadcast::channel(100);
        Self::new(priorities, &MeasurementKind::ALL, events)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<FusionEvent> {
        self.events.subscribe()
    }

    pub fn priorities(&self) -> &PriorityTable {
        &self.priorities
    }

    pub fn tracks(&self, kind: MeasurementKind) -> bool {
        self.slots.contains_key(&kind)
    }

    /// Add a live sensor and recompute the best source of its kind.
    pub fn register(&self, sensor: Arc<Sensor>) -> Result<(), SensorError> {
        let kind = sensor.kind();
        let Some(slot) = self.slots.get(&kind) else {
            tracing::warn!(
                "Rejected {} sensor from device {}: kind not tracked",
                kind,
                sensor.device()
            );
            return Err(SensorError::UnknownKind(kind));
        };

        let mut events = Vec::new();
        let retarget = {
            let mut slot = lock(slot);
            if slot.contains(sensor.id()) {
                return Ok(());
            }

            match slot
                .buckets
                .iter_mut()
                .find(|b| b.device_kind == sensor.device_kind())
            {
                Some(bucket) => bucket.sensors.push_back(sensor.clone()),
                None => slot.buckets.push(Bucket {
                    device_kind: sensor.device_kind(),
                    sensors: VecDeque::from([sensor.clone()]),
                }),
            }

            events.push(FusionEvent::SensorRegistered {
                device: sensor.device(),
                device_kind: sensor.device_kind(),
                kind,
            });

            let proxy = match &slot.proxy {
                Some(proxy) => proxy.clone(),
                None => {
                    let proxy = Arc::new(ProxyHandle::new(kind));
                    slot.proxy = Some(proxy.clone());
                    events.push(FusionEvent::KindAvailable(kind));
                    proxy
                }
            };

            let best = slot.best(self.priorities.get(kind));
            let retarget = proxy.retarget(best.as_ref());
            if retarget.is_some() {
                events.push(FusionEvent::BestChanged {
                    kind,
                    device: best.as_ref().map(|s| s.device()),
                });
            }
            retarget
        };

        tracing::debug!(
            "Registered {} sensor from {} device {}",
            kind,
            sensor.device_kind(),
            sensor.device()
        );
        self.finish(retarget, events);
        Ok(())
    }

    /// Remove a sensor. Returns false if it was not registered.
    pub fn unregister(&self, sensor: &Sensor) -> bool {
        let kind = sensor.kind();
        let Some(slot) = self.slots.get(&kind) else {
            return false;
        };

        let mut events = Vec::new();
        let retarget = {
            let mut slot = lock(slot);

            let Some(index) = slot.buckets.iter().position(|b| {
                b.sensors.iter().any(|s| s.id() == sensor.id())
            }) else {
                return false;
            };

            let bucket = &mut slot.buckets[index];
            bucket.sensors.retain(|s| s.id() != sensor.id());
            if bucket.sensors.is_empty() {
                slot.buckets.remove(index);
            }

            events.push(FusionEvent::SensorUnregistered {
                device: sensor.device(),
                device_kind: sensor.device_kind(),
                kind,
            });

            if slot.is_empty() {
                events.push(FusionEvent::KindRemoved(kind));
                slot.proxy.take().and_then(|proxy| proxy.detach())
            } else {
                let best = slot.best(self.priorities.get(kind));
                let retarget = slot
                    .proxy
                    .as_ref()
                    .and_then(|proxy| proxy.retarget(best.as_ref()));
                if retarget.is_some() {
                    events.push(FusionEvent::BestChanged {
                        kind,
                        device: best.as_ref().map(|s| s.device()),
                    });
                }
                retarget
            }
        };

        tracing::debug!(
            "Unregistered {} sensor from device {}",
            kind,
            sensor.device()
        );
        self.finish(retarget, events);
        true
    }

    fn finish(&self, retarget: Option<Retarget>, events: Vec<FusionEvent>) {
        if let Some(retarget) = retarget {
            retarget.deliver();
        }
        for event in events {
            let _ = self.events.send(event);
        }
    }

    /// The highest-priority live sensor of `kind`.
    pub fn best_sensor(&self, kind: MeasurementKind) -> Option<Arc<Sensor>> {
        let slot = lock(self.slots.get(&kind)?);
        slot.best(self.priorities.get(kind))
    }

    /// The indirection handle for `kind`, if any sensor of that kind is live.
    pub fn proxy(&self, kind: MeasurementKind) -> Option<Arc<ProxyHandle>> {
        lock(self.slots.get(&kind)?).proxy.clone()
    }

    /// Kinds that currently have at least one live sensor.
    pub fn available_kinds(&self) -> Vec<MeasurementKind> {
        MeasurementKind::ALL
            .into_iter()
            .filter(|kind| {
                self.slots
                    .get(kind)
                    .map_or(false, |slot| lock(slot).proxy.is_some())
            })
            .collect()
    }

    /// Every live sensor, grouped by kind.
    pub fn all_sensors(&self) -> Vec<Arc<Sensor>> {
        self.collect(|_, _| true)
    }

    /// Every live sensor that is not the best source of its kind.
    pub fn all_but_best(&self) -> Vec<Arc<Sensor>> {
        self.collect(|sensor, best| best.map_or(true, |b| b.id() != sensor.id()))
    }

    /// Point-in-time view of every live sensor.
    pub fn snapshot(&self) -> Vec<SensorSnapshot> {
        let mut snapshots = Vec::new();
        self.visit(|sensor, best| {
            snapshots.push(SensorSnapshot {
                sensor_id: sensor.id(),
                device: sensor.device(),
                device_kind: sensor.device_kind(),
                kind: sensor.kind(),
                value: sensor.value(),
                is_best: best.map_or(false, |b| b.id() == sensor.id()),
            });
        });
        snapshots
    }

    fn collect(&self, keep: impl Fn(&Arc<Sensor>, Option<&Arc<Sensor>>) -> bool) -> Vec<Arc<Sensor>> {
        let mut sensors = Vec::new();
        self.visit(|sensor, best| {
            if keep(sensor, best) {
                sensors.push(sensor.clone());
            }
        });
        sensors
    }

    fn visit(&self, mut f: impl FnMut(&Arc<Sensor>, Option<&Arc<Sensor>>)) {
        for kind in MeasurementKind::ALL {
            let Some(slot) = self.slots.get(&kind) else {
                continue;
            };
            let slot = lock(slot);
            let best = slot.best(self.priorities.get(kind));
            for bucket in &slot.buckets {
                for sensor in &bucket.sensors {
                    f(sensor, best.as_ref());
                }
            }
        }
    }

    /// Remove every sensor of `device`. Returns how many were removed.
    pub fn unregister_device(&self, device: DeviceId) -> usize {
        let owned: Vec<Arc<Sensor>> = self
            .all_sensors()
            .into_iter()
            .filter(|s| s.device() == device)
            .collect();
        owned.iter().filter(|s| self.unregister(s)).count()
    }

    /// Drop all sensors and tear down every proxy handle.
    pub fn clear(&self) {
        for sensor in self.all_sensors() {
            self.unregister(&sensor);
        }
    }
}

impl std::fmt::Debug for SensorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorRegistry")
            .field("priorities", &self.priorities)
            .field("available", &self.available_kinds())
            .finish()
    }
}
