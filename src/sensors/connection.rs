//! Device connection lifecycle.
//!
//! [`ConnectionStateMachine`] is the pure transition table; [`ConnectionDriver`]
//! runs it as a tokio task per device, feeding transport events in and applying
//! the resulting actions to the [`FusionContext`]. Only while a device is
//! `ConnectedWithService` are its sensors registered.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::sensors::context::FusionContext;
use crate::sensors::telemetry::Sample;
use crate::sensors::types::{ConnectionState, DeviceId};

/// Input to the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Start looking for the device
    StartSearch,
    /// Transport link established
    Found,
    /// Measurement service resolved and notifying
    ServiceReady,
    /// Link dropped by the transport
    Lost,
    /// Explicit disconnect request
    Disconnect,
    /// Search deadline expired
    SearchTimeout,
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionAction {
    /// State changed to the given value
    StateChanged(ConnectionState),
    /// Register every sensor the device owns
    RegisterSensors,
    /// Unregister every sensor and clear decoder history
    UnregisterSensors,
    /// Searching ended
    SearchFinished { found: bool },
}

/// Connection state of one device.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the search deadline applies in the current state.
    pub fn is_searching(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Searching | ConnectionState::ConnectedToTransport
        )
    }

    pub fn handle(&mut self, event: ConnectionEvent) -> Vec<ConnectionAction> {
        use ConnectionEvent as E;
        use ConnectionState as S;

        let (next, mut actions) = match (self.state, event) {
            (S::Disconnected, E::StartSearch) => (S::Searching, vec![]),
            (S::Searching, E::Found) => (S::ConnectedToTransport, vec![]),
            (S::Searching | S::ConnectedToTransport, E::ServiceReady) => (
                S::ConnectedWithService,
                vec![
                    ConnectionAction::RegisterSensors,
                    ConnectionAction::SearchFinished { found: true },
                ],
            ),
            (S::Searching | S::ConnectedToTransport, E::SearchTimeout | E::Disconnect) => (
                S::Disconnected,
                vec![ConnectionAction::SearchFinished { found: false }],
            ),
            (S::ConnectedToTransport, E::Lost) => (S::Searching, vec![]),
            (S::ConnectedWithService, E::Lost) => {
                (S::Searching, vec![ConnectionAction::UnregisterSensors])
            }
            (S::ConnectedWithService, E::Disconnect) => {
                (S::Disconnected, vec![ConnectionAction::UnregisterSensors])
            }
            (state, event) => {
                tracing::debug!("Ignoring {:?} while {}", event, state);
                return Vec::new();
            }
        };

        self.state = next;
        actions.insert(0, ConnectionAction::StateChanged(next));
        actions
    }
}

/// Event delivered by a transport collaborator for one device.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    StartSearch,
    Found,
    ServiceReady,
    /// Raw measurement payload
    Payload(Vec<u8>),
    /// Sample already decoded by the platform
    Sample(Sample),
    Lost,
    Disconnect,
}

enum Step {
    Transport(TransportEvent),
    Timeout,
    Closed,
}

/// Per-device producer task.
pub struct ConnectionDriver {
    context: Arc<FusionContext>,
    device: DeviceId,
    machine: ConnectionStateMachine,
    search_timeout: Duration,
    deadline: Option<Instant>,
}

impl ConnectionDriver {
    pub fn new(context: Arc<FusionContext>, device: DeviceId, search_timeout: Duration) -> Self {
        Self {
            context,
            device,
            machine: ConnectionStateMachine::new(),
            search_timeout,
            deadline: None,
        }
    }

    /// Spawn a driver task and return the sender feeding it.
    pub fn spawn(
        context: Arc<FusionContext>,
        device: DeviceId,
        search_timeout: Duration,
    ) -> (mpsc::Sender<TransportEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(100);
        let driver = Self::new(context, device, search_timeout);
        let handle = tokio::spawn(driver.run(rx));
        (tx, handle)
    }

    pub fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    /// Process events until the sender side is dropped.
    pub async fn run(mut self, mut rx: mpsc::Receiver<TransportEvent>) {
        tracing::info!("Connection driver started for device {}", self.device);

        loop {
            let deadline = self.deadline;
            let step = tokio::select! {
                received = rx.recv() => match received {
                    Some(event) => Step::Transport(event),
                    None => Step::Closed,
                },
                _ = async {
                    match deadline {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                } => Step::Timeout,
            };

            match step {
                Step::Transport(event) => self.on_transport(event),
                Step::Timeout => {
                    tracing::info!("Search timed out for device {}", self.device);
                    self.on_connection(ConnectionEvent::SearchTimeout);
                }
                Step::Closed => break,
            }
        }

        self.on_connection(ConnectionEvent::Disconnect);
        tracing::info!("Connection driver stopped for device {}", self.device);
    }

    /// Handle one transport event without waiting on the channel.
    pub fn on_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::StartSearch => self.on_connection(ConnectionEvent::StartSearch),
            TransportEvent::Found => self.on_connection(ConnectionEvent::Found),
            TransportEvent::ServiceReady => self.on_connection(ConnectionEvent::ServiceReady),
            TransportEvent::Lost => self.on_connection(ConnectionEvent::Lost),
            TransportEvent::Disconnect => self.on_connection(ConnectionEvent::Disconnect),
            TransportEvent::Payload(bytes) => {
                if self.machine.state() == ConnectionState::ConnectedWithService {
                    if let Err(e) = self.context.ingest(self.device, &bytes) {
                        tracing::warn!("Payload for device {} dropped: {}", self.device, e);
                    }
                }
            }
            TransportEvent::Sample(sample) => {
                if self.machine.state() == ConnectionState::ConnectedWithService {
                    if let Err(e) = self.context.submit_sample(self.device, sample) {
                        tracing::warn!("Sample for device {} dropped: {}", self.device, e);
                    }
                }
            }
        }
    }

    /// Feed one event through the state machine and apply its actions.
    pub fn on_connection(&mut self, event: ConnectionEvent) {
        for action in self.machine.handle(event) {
            let result = match action {
                ConnectionAction::StateChanged(state) => {
                    self.context.set_connection_state(self.device, state)
                }
                ConnectionAction::RegisterSensors => self.context.register_device(self.device),
                ConnectionAction::UnregisterSensors => {
                    self.context.unregister_device(self.device)
                }
                ConnectionAction::SearchFinished { found } => {
                    self.context.search_finished(self.device, found);
                    Ok(())
                }
            };
            if let Err(e) = result {
                tracing::warn!("Device {}: {}", self.device, e);
            }
        }

        if !self.machine.is_searching() {
            self.deadline = None;
        } else if self.deadline.is_none() {
            self.deadline = Some(Instant::now() + self.search_timeout);
        }
    }
}
