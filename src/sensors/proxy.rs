//! Stable per-kind indirection handle.
//!
//! Consumers subscribe to a [`ProxyHandle`] once and never to a concrete
//! [`Sensor`]. The registry redirects the handle whenever the best source for
//! its kind changes, moving every subscriber along with it.

use arc_swap::ArcSwapAny;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::sensors::measurement::MeasurementKind;
use crate::sensors::sensor::{lock, ListenerId, Sensor, SensorListener, Subscriber};
use crate::sensors::types::SensorValue;

/// Indirection handle for one measurement kind.
pub struct ProxyHandle {
    kind: MeasurementKind,
    /// Back-reference to the backing sensor; never owning
    target: ArcSwapAny<Weak<Sensor>>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_listener: AtomicU64,
    detached: AtomicBool,
}

impl ProxyHandle {
    pub(crate) fn new(kind: MeasurementKind) -> Self {
        Self {
            kind,
            target: ArcSwapAny::new(Weak::new()),
            subscribers: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            detached: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> MeasurementKind {
        self.kind
    }

    /// Current value of the backing sensor, or `None` when there is none.
    pub fn value(&self) -> Option<SensorValue> {
        self.target.load().upgrade()?.value()
    }

    /// The sensor currently backing this handle.
    pub fn current_sensor(&self) -> Option<Arc<Sensor>> {
        self.target.load().upgrade()
    }

    /// Whether the registry has torn this handle down.
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    pub fn subscribe(&self, listener: Arc<dyn SensorListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        let subscriber = Subscriber { id, listener };

        let mut subscribers = lock(&self.subscribers);
        if let Some(sensor) = self.target.load().upgrade() {
            sensor.subscribers().push(subscriber.clone());
        }
        subscribers.push(subscriber);

        id
    }

    /// Remove a subscription. Returns false if the id was not subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut subscribers = lock(&self.subscribers);
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);

        if let Some(sensor) = self.target.load().upgrade() {
            sensor.subscribers().retain(|s| s.id != id);
        }

        subscribers.len() != before
    }

    pub fn subscriber_ids(&self) -> Vec<ListenerId> {
        lock(&self.subscribers).iter().map(|s| s.id).collect()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    /// Point the handle at `next`, migrating all subscribers.
    ///
    /// Subscribers are removed from the old sensor and added to the new one
    /// while both subscriber lists are locked, so no upstream event is seen
    /// twice or missed by the move itself. The returned [`Retarget`] tells the
    /// moved subscribers about the new value and must be delivered after the
    /// caller has released its own locks.
    #[must_use]
    pub(crate) fn retarget(&self, next: Option<&Arc<Sensor>>) -> Option<Retarget> {
        let subscribers = lock(&self.subscribers);
        let previous = self.target.load().upgrade();

        let unchanged = match (&previous, next) {
            (Some(a), Some(b)) => a.id() == b.id(),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return None;
        }

        let ids: Vec<ListenerId> = subscribers.iter().map(|s| s.id).collect();
        match (&previous, next) {
            (Some(old), Some(new)) => {
                // Lock in id order; every retarget agrees on it.
                let (mut old_list, mut new_list) = if old.id() < new.id() {
                    let o = old.subscribers();
                    let n = new.subscribers();
                    (o, n)
                } else {
                    let n = new.subscribers();
                    let o = old.subscribers();
                    (o, n)
                };
                old_list.retain(|s| !ids.contains(&s.id));
                new_list.retain(|s| !ids.contains(&s.id));
                new_list.extend(subscribers.iter().cloned());
                self.target.store(Arc::downgrade(new));
            }
            (Some(old), None) => {
                old.subscribers().retain(|s| !ids.contains(&s.id));
                self.target.store(Weak::new());
            }
            (None, Some(new)) => {
                let mut new_list = new.subscribers();
                new_list.retain(|s| !ids.contains(&s.id));
                new_list.extend(subscribers.iter().cloned());
                self.target.store(Arc::downgrade(new));
            }
            (None, None) => {}
        }

        Some(Retarget {
            kind: self.kind,
            target: next.cloned(),
            subscribers: subscribers.clone(),
        })
    }

    /// Release the backing sensor and mark the handle torn down.
    #[must_use]
    pub(crate) fn detach(&self) -> Option<Retarget> {
        let retarget = self.retarget(None);
        self.detached.store(true, Ordering::Release);
        retarget
    }
}

/// Pending "source changed" notification for the subscribers of a handle.
#[must_use]
pub(crate) struct Retarget {
    kind: MeasurementKind,
    target: Option<Arc<Sensor>>,
    subscribers: Vec<Subscriber>,
}

impl Retarget {
    pub(crate) fn deliver(self) {
        let value = self.target.as_ref().and_then(|s| s.value());
        for subscriber in self.subscribers {
            subscriber.listener.on_value(self.kind, value);
        }
    }
}

impl std::fmt::Debug for ProxyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyHandle")
            .field("kind", &self.kind)
            .field("target", &self.current_sensor().map(|s| s.id()))
            .field("subscribers", &self.subscriber_count())
            .field("detached", &self.is_detached())
            .finish()
    }
}
