//! Per-session root object of the fusion engine.
//!
//! A [`FusionContext`] is constructed once per tracking session and passed to
//! every collaborator. It owns the registry, the attached devices and the
//! observer channel; [`FusionContext::teardown`] ends the session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, PoisonError};
use tokio::sync::broadcast;

use crate::sensors::accumulator::SessionPause;
use crate::sensors::device::{DeviceHandle, DeviceSettings};
use crate::sensors::events::FusionEvent;
use crate::sensors::measurement::MeasurementKind;
use crate::sensors::proxy::ProxyHandle;
use crate::sensors::registry::{SensorRegistry, SensorSnapshot};
use crate::sensors::sensor::Sensor;
use crate::sensors::telemetry::{DecoderTable, Sample};
use crate::sensors::types::{
    ConnectionState, DeviceId, DeviceKind, Protocol, SensorError, SensorValue,
};
use crate::storage::config::FusionConfig;

/// Point-in-time view of a session for the persistence collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub taken_at: DateTime<Utc>,
    pub paused: bool,
    /// Best value per kind
    pub values: BTreeMap<MeasurementKind, SensorValue>,
    /// Every live sensor
    pub sensors: Vec<SensorSnapshot>,
}

/// Fusion engine state for one tracking session.
pub struct FusionContext {
    config: FusionConfig,
    settings: DeviceSettings,
    registry: SensorRegistry,
    decoders: DecoderTable,
    devices: RwLock<HashMap<DeviceId, Arc<DeviceHandle>>>,
    pause: SessionPause,
    events: broadcast::Sender<FusionEvent>,
}

impl FusionContext {
    pub fn new(config: FusionConfig) -> Self {
        Self::with_decoders(config, DecoderTable::standard())
    }

    pub fn with_decoders(config: FusionConfig, decoders: DecoderTable) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let registry = SensorRegistry::new(
            config.priorities.clone(),
            &MeasurementKind::ALL,
            events.clone(),
        );
        let settings = DeviceSettings {
            absent_threshold: config.absent_threshold,
            respect_pause: config.respect_pause,
            wheel_circumference_m: config.wheel_circumference_m(),
        };

        tracing::info!("Fusion context created");

        Self {
            config,
            settings,
            registry,
            decoders,
            devices: RwLock::new(HashMap::new()),
            pause: SessionPause::new(),
            events,
        }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn registry(&self) -> &SensorRegistry {
        &self.registry
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<FusionEvent> {
        self.events.subscribe()
    }

    fn read_devices(&self) -> RwLockReadGuard<'_, HashMap<DeviceId, Arc<DeviceHandle>>> {
        self.devices.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_devices(&self) -> RwLockWriteGuard<'_, HashMap<DeviceId, Arc<DeviceHandle>>> {
        self.devices.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: FusionEvent) {
        let _ = self.events.send(event);
    }

    // ========== Devices ==========

    /// Attach a device. Its sensors stay unregistered until it is connected.
    pub fn attach_device(
        &self,
        id: DeviceId,
        protocol: Protocol,
        device_kind: DeviceKind,
    ) -> Result<Arc<DeviceHandle>, SensorError> {
        let decoder = match protocol {
            Protocol::Platform => None,
            _ => Some(self.decoders.create(
                protocol,
                device_kind,
                self.config.stall_threshold(device_kind),
            )?),
        };

        let mut devices = self.write_devices();
        if devices.contains_key(&id) {
            return Err(SensorError::AlreadyAttached(id));
        }

        let device = Arc::new(DeviceHandle::new(
            id,
            protocol,
            device_kind,
            decoder,
            &self.pause,
            &self.settings,
        )?);
        devices.insert(id, device.clone());

        tracing::info!("Attached {} {} device {}", protocol, device_kind, id);
        Ok(device)
    }

    /// Detach a device, unregistering all of its sensors.
    pub fn detach_device(&self, id: DeviceId) -> Result<(), SensorError> {
        let device = self
            .write_devices()
            .remove(&id)
            .ok_or(SensorError::DeviceNotFound(id))?;

        device.set_state(ConnectionState::Disconnected);
        self.unregister_sensors(&device);

        tracing::info!("Detached device {}", id);
        Ok(())
    }

    pub fn device(&self, id: DeviceId) -> Result<Arc<DeviceHandle>, SensorError> {
        self.read_devices()
            .get(&id)
            .cloned()
            .ok_or(SensorError::DeviceNotFound(id))
    }

    pub fn devices(&self) -> Vec<Arc<DeviceHandle>> {
        let mut devices: Vec<_> = self.read_devices().values().cloned().collect();
        devices.sort_by_key(|d| d.id());
        devices
    }

    // ========== Connection lifecycle ==========

    /// Record a connection state change and notify observers.
    pub fn set_connection_state(&self, id: DeviceId, state: ConnectionState) -> Result<(), SensorError> {
        let device = self.device(id)?;
        if device.set_state(state) != state {
            tracing::info!("Device {} is now {}", id, state);
            self.emit(FusionEvent::ConnectionChanged { device: id, state });
        }
        Ok(())
    }

    /// Make the device's core sensors live, plus any optional ones that
    /// already reported. No-op unless the device is connected.
    pub fn register_device(&self, id: DeviceId) -> Result<(), SensorError> {
        let device = self.device(id)?;
        self.register_live(&device)
    }

    fn register_live(&self, device: &DeviceHandle) -> Result<(), SensorError> {
        let mut registered = device.registration();
        if device.state() != ConnectionState::ConnectedWithService {
            return Ok(());
        }
        for sensor in device.live_sensors() {
            let kind = sensor.kind();
            if !registered.contains(&kind) {
                self.registry.register(sensor)?;
                registered.insert(kind);
            }
        }
        Ok(())
    }

    /// Withdraw every sensor of the device and forget its decoder history.
    pub fn unregister_device(&self, id: DeviceId) -> Result<(), SensorError> {
        let device = self.device(id)?;
        self.unregister_sensors(&device);
        Ok(())
    }

    fn unregister_sensors(&self, device: &DeviceHandle) {
        {
            let mut registered = device.registration();
            for sensor in device.sensors() {
                self.registry.unregister(sensor);
            }
            registered.clear();
        }
        device.clear_history();
    }

    /// Mark the device connected and register its sensors.
    pub fn connect(&self, id: DeviceId) -> Result<(), SensorError> {
        self.set_connection_state(id, ConnectionState::ConnectedWithService)?;
        self.register_device(id)
    }

    /// Mark the device disconnected and unregister its sensors.
    pub fn disconnect(&self, id: DeviceId) -> Result<(), SensorError> {
        self.set_connection_state(id, ConnectionState::Disconnected)?;
        self.unregister_device(id)
    }

    pub fn search_finished(&self, id: DeviceId, found: bool) {
        if !found {
            tracing::warn!("Search for device {} finished without a connection", id);
        }
        self.emit(FusionEvent::SearchFinished { device: id, found });
    }

    // ========== Data path ==========

    /// Decode and apply a raw payload. Returns how many samples were applied.
    ///
    /// Malformed payloads are logged and skipped; previous values are retained.
    pub fn ingest(&self, id: DeviceId, payload: &[u8]) -> Result<usize, SensorError> {
        let device = self.device(id)?;
        if device.state() != ConnectionState::ConnectedWithService {
            tracing::debug!("Device {} not connected, payload dropped", id);
            return Ok(0);
        }

        match device.ingest(payload) {
            Ok(applied) => {
                if applied > 0 {
                    self.register_live(&device)?;
                }
                Ok(applied)
            }
            Err(e) => {
                tracing::debug!("Skipped payload from device {}: {}", id, e);
                Ok(0)
            }
        }
    }

    /// Apply a sample decoded by the platform.
    ///
    /// Values are converted to the kind's representation first.
    pub fn submit_sample(&self, id: DeviceId, sample: Sample) -> Result<bool, SensorError> {
        let device = self.device(id)?;
        if device.state() != ConnectionState::ConnectedWithService {
            tracing::debug!("Device {} not connected, sample dropped", id);
            return Ok(false);
        }

        let sample = match sample {
            Sample::Value(kind, value) => {
                Sample::Value(kind, value.map(|v| kind.value_of(v.as_f64())))
            }
            delta => delta,
        };

        let applied = device.apply(sample);
        if applied {
            self.register_live(&device)?;
        }
        Ok(applied)
    }

    // ========== Session control ==========

    /// Continue a persisted total on one device.
    pub fn seed(&self, id: DeviceId, kind: MeasurementKind, value: f64) -> Result<(), SensorError> {
        self.device(id)?.seed(kind, value).map_err(|e| {
            tracing::warn!("Seed rejected for device {}: {}", id, e);
            e
        })
    }

    /// Update the calibration factor of a device.
    pub fn update_calibration(&self, id: DeviceId, factor: f64) -> Result<(), SensorError> {
        let device = self.device(id)?;
        if let Err(e) = device.set_calibration(factor) {
            tracing::warn!("Calibration rejected for device {}: {}", id, e);
            return Err(e);
        }

        tracing::info!("Calibration of device {} set to {}", id, factor);
        self.emit(FusionEvent::CalibrationChanged { device: id, factor });
        Ok(())
    }

    pub fn pause(&self) {
        tracing::info!("Session paused");
        self.pause.pause();
    }

    pub fn resume(&self) {
        tracing::info!("Session resumed");
        self.pause.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    /// Start a new lap: every lap distance restarts at zero.
    pub fn lap(&self) {
        for device in self.devices() {
            device.reset_lap();
        }
        tracing::info!("Lap started");
    }

    // ========== Consumers ==========

    pub fn proxy(&self, kind: MeasurementKind) -> Option<Arc<ProxyHandle>> {
        self.registry.proxy(kind)
    }

    pub fn value(&self, kind: MeasurementKind) -> Option<SensorValue> {
        self.registry.proxy(kind)?.value()
    }

    pub fn best_sensor(&self, kind: MeasurementKind) -> Option<Arc<Sensor>> {
        self.registry.best_sensor(kind)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let values = MeasurementKind::ALL
            .into_iter()
            .filter_map(|kind| Some((kind, self.value(kind)?)))
            .collect();

        SessionSnapshot {
            taken_at: Utc::now(),
            paused: self.is_paused(),
            values,
            sensors: self.registry.snapshot(),
        }
    }

    /// Detach every device and tear down all proxy handles.
    pub fn teardown(&self) {
        let devices: Vec<_> = self.write_devices().drain().map(|(_, d)| d).collect();
        for device in &devices {
            device.set_state(ConnectionState::Disconnected);
            self.unregister_sensors(device);
        }
        self.registry.clear();

        tracing::info!("Fusion context torn down ({} devices)", devices.len());
    }
}

impl std::fmt::Debug for FusionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FusionContext")
            .field("devices", &self.devices().len())
            .field("registry", &self.registry)
            .field("paused", &self.is_paused())
            .finish()
    }
}
