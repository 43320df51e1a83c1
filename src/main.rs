//! RideFusion - capture replay
//!
//! Replays a JSON-lines capture of transport and session events through a
//! fusion context and prints the fused value of every measurement kind.
//!
//! Usage: `ridefusion <capture.jsonl> [config.toml]`

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ridefusion::sensors::{
    ConnectionDriver, DeviceId, DeviceKind, FusionContext, MeasurementKind, Protocol, Sample,
    SensorValue, TransportEvent,
};
use ridefusion::storage::config::{load_config, load_config_from};

/// One line of a capture file.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum CaptureRecord {
    Attach {
        device: u32,
        protocol: Protocol,
        device_kind: DeviceKind,
    },
    StartSearch { device: u32 },
    Found { device: u32 },
    ServiceReady { device: u32 },
    Payload { device: u32, bytes: Vec<u8> },
    Value {
        device: u32,
        kind: MeasurementKind,
        value: Option<SensorValue>,
    },
    Delta {
        device: u32,
        kind: MeasurementKind,
        value: f64,
    },
    Lost { device: u32 },
    Disconnect { device: u32 },
    Seed {
        device: u32,
        kind: MeasurementKind,
        value: f64,
    },
    Calibrate { device: u32, factor: f64 },
    Pause,
    Resume,
    Lap,
}

struct Replay {
    context: Arc<FusionContext>,
    drivers: HashMap<DeviceId, ConnectionDriver>,
}

impl Replay {
    fn new(context: Arc<FusionContext>) -> Self {
        Self {
            context,
            drivers: HashMap::new(),
        }
    }

    fn transport(&mut self, device: u32, event: TransportEvent) -> Result<()> {
        let driver = self
            .drivers
            .get_mut(&DeviceId(device))
            .with_context(|| format!("device {} used before attach", device))?;
        driver.on_transport(event);
        Ok(())
    }

    fn apply(&mut self, record: CaptureRecord) -> Result<()> {
        match record {
            CaptureRecord::Attach {
                device,
                protocol,
                device_kind,
            } => {
                let id = DeviceId(device);
                self.context.attach_device(id, protocol, device_kind)?;
                let timeout = self.context.config().search_timeout();
                self.drivers
                    .insert(id, ConnectionDriver::new(self.context.clone(), id, timeout));
            }
            CaptureRecord::StartSearch { device } => {
                self.transport(device, TransportEvent::StartSearch)?
            }
            CaptureRecord::Found { device } => self.transport(device, TransportEvent::Found)?,
            CaptureRecord::ServiceReady { device } => {
                self.transport(device, TransportEvent::ServiceReady)?
            }
            CaptureRecord::Payload { device, bytes } => {
                self.transport(device, TransportEvent::Payload(bytes))?
            }
            CaptureRecord::Value {
                device,
                kind,
                value,
            } => self.transport(device, TransportEvent::Sample(Sample::Value(kind, value)))?,
            CaptureRecord::Delta {
                device,
                kind,
                value,
            } => self.transport(device, TransportEvent::Sample(Sample::Delta(kind, value)))?,
            CaptureRecord::Lost { device } => self.transport(device, TransportEvent::Lost)?,
            CaptureRecord::Disconnect { device } => {
                self.transport(device, TransportEvent::Disconnect)?
            }
            CaptureRecord::Seed {
                device,
                kind,
                value,
            } => self.context.seed(DeviceId(device), kind, value)?,
            CaptureRecord::Calibrate { device, factor } => {
                self.context.update_calibration(DeviceId(device), factor)?
            }
            CaptureRecord::Pause => self.context.pause(),
            CaptureRecord::Resume => self.context.resume(),
            CaptureRecord::Lap => self.context.lap(),
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting RideFusion v{}", env!("CARGO_PKG_VERSION"));

    let mut args = std::env::args().skip(1);
    let Some(capture) = args.next().map(PathBuf::from) else {
        bail!("usage: ridefusion <capture.jsonl> [config.toml]");
    };

    let config = match args.next() {
        Some(path) => load_config_from(&PathBuf::from(path))?,
        None => load_config()?,
    };

    let context = Arc::new(FusionContext::new(config));
    let mut events = context.subscribe_events();
    let mut replay = Replay::new(context.clone());

    let file = std::fs::File::open(&capture)
        .with_context(|| format!("cannot open {}", capture.display()))?;

    for (index, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let record: CaptureRecord = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid record", capture.display(), index + 1))?;

        if let Err(e) = replay.apply(record) {
            tracing::warn!("{}:{}: {}", capture.display(), index + 1, e);
        }

        while let Ok(event) = events.try_recv() {
            tracing::debug!("{:?}", event);
        }
    }

    let snapshot = context.snapshot();
    for (kind, value) in &snapshot.values {
        println!("{:<22} {}", kind.to_string(), kind.format(*value));
    }
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    context.teardown();
    Ok(())
}
