//! Wires configuration into running tasks: resolves USB devices to serial
//! ports, builds the distribution queues and relays, and dispatches every
//! configured task onto the runtime, mirroring `main()`'s task-dispatch
//! loop in the original.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{info, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;

use crate::actuator::RppalActuator;
use crate::attitude::Cmps12Sensor;
use crate::autopilot::Autopilot;
use crate::command::{CommandStore, NullCommandStore, RedisCommandStore};
use crate::config::{HelmsmanConfig, TaskDef};
use crate::error::{HelmError, Result};
use crate::relay::SentenceRelay;
use crate::state::BoatState;
use crate::usb::UsbDeviceFinder;
use crate::{logger, serial, udp};

pub struct Supervisor<F> {
    config: HelmsmanConfig,
    usb_finder: F,
}

impl<F: UsbDeviceFinder + 'static> Supervisor<F> {
    pub fn with_finder(config: HelmsmanConfig, usb_finder: F) -> Self {
        Self { config, usb_finder }
    }

    /// Builds every task described by the configuration and runs until
    /// cancelled (Ctrl-C, or every task exiting on its own).
    pub async fn run(self) -> Result<()> {
        let state = BoatState::new();

        let command_store: Arc<dyn CommandStore> = if self.config.redis_url.is_empty() {
            warn!("no redis_url configured, falling back to an in-memory command store (bench use only)");
            Arc::new(NullCommandStore::default())
        } else {
            let store = RedisCommandStore::connect(&self.config.redis_url)
                .await
                .map_err(|e| HelmError::Startup(format!("redis connect failed: {e}")))?;
            Arc::new(store)
        };

        let attached = self.usb_finder.find(&self.config.usb_devices);

        let mut serial_paths: HashMap<String, (PathBuf, u32)> = HashMap::new();
        for (usb_name, def) in &self.config.serial_ports {
            match attached.get(usb_name) {
                Some(path) => {
                    info!("serial port {} ({usb_name}) -> {}", def.name, path.display());
                    serial_paths.insert(def.name.clone(), (path.clone(), def.baud));
                }
                None => warn!("serial port {} ({usb_name}) not attached, skipping", def.name),
            }
        }

        let mut queue_txs: HashMap<String, UnboundedSender<Bytes>> = HashMap::new();
        let mut queue_rxs: HashMap<String, UnboundedReceiver<Bytes>> = HashMap::new();
        for q in &self.config.distribution_queues {
            let (tx, rx) = mpsc::unbounded_channel();
            queue_txs.insert(q.clone(), tx);
            queue_rxs.insert(q.clone(), rx);
        }

        let mut relays: HashMap<String, Arc<SentenceRelay>> = HashMap::new();
        for (name, q_list) in &self.config.relays {
            let targets: Vec<(String, UnboundedSender<Bytes>)> = q_list
                .iter()
                .filter_map(|q| queue_txs.get(q).map(|tx| (q.clone(), tx.clone())))
                .collect();
            relays.insert(name.clone(), Arc::new(SentenceRelay::new(name.clone(), targets)));
        }

        let mut tasks: JoinSet<Result<()>> = JoinSet::new();

        for task in self.config.tasks {
            match task {
                TaskDef::AutoHelm => {
                    let sensor = Cmps12Sensor::open();
                    let actuator = RppalActuator::open();
                    match (sensor, actuator) {
                        (Ok(sensor), Ok(actuator)) => {
                            let ap = Autopilot::new(sensor, actuator, Arc::clone(&command_store), state.clone())
                                .with_timing(
                                    Duration::from_secs(self.config.sensor_warmup_secs),
                                    Duration::from_millis(self.config.tick_interval_ms),
                                );
                            tasks.spawn(async move {
                                ap.run().await;
                                Ok(())
                            });
                        }
                        (Err(e), _) | (_, Err(e)) => {
                            return Err(HelmError::Startup(format!("auto_helm hardware init failed: {e}")));
                        }
                    }
                }
                TaskDef::Log => {
                    let state = state.clone();
                    let command_store = Arc::clone(&command_store);
                    let log_dir = self.config.log_dir.clone();
                    let interval = Duration::from_secs(self.config.log_interval_secs);
                    let snapshot_every = self.config.log_snapshot_every;
                    tasks.spawn(async move {
                        logger::run(state, command_store, log_dir, interval, snapshot_every).await;
                        Ok(())
                    });
                }
                TaskDef::UdpSender { read_queue, ip, port, relays_writing_udp } => {
                    let Some(rx) = queue_rxs.remove(&read_queue) else {
                        return Err(HelmError::Startup(format!("udp_sender: queue {read_queue:?} not declared")));
                    };
                    let ip = ip.unwrap_or_else(|| self.config.udp_ip.clone());
                    let port = port.unwrap_or(self.config.udp_port);
                    let relay_list: Vec<Arc<SentenceRelay>> = relays_writing_udp
                        .iter()
                        .filter_map(|r| relays.get(r).cloned())
                        .collect();
                    tasks.spawn(async move {
                        udp::run(read_queue, rx, ip, port, relay_list).await;
                        Ok(())
                    });
                }
                TaskDef::NmeaReader { read_serial, relay_to } => {
                    let Some((path, baud)) = serial_paths.get(&read_serial).cloned() else {
                        warn!("nmea_reader: serial port {read_serial:?} not attached, skipping");
                        continue;
                    };
                    let relay = relays.get(&relay_to).cloned();
                    let state = state.clone();
                    let mut mag_var = 0.0f64;
                    serial::spawn_line_reader(read_serial.clone(), path, baud, move |line: Bytes| {
                        if let Ok(text) = std::str::from_utf8(&line) {
                            let _ = crate::nmea::decode_sentence(text, &state, &mut mag_var);
                        }
                        if let Some(relay) = &relay {
                            relay.put(line);
                        }
                    });
                }
                TaskDef::RelaySerialInput { read_serial, relay_to } => {
                    let Some((path, baud)) = serial_paths.get(&read_serial).cloned() else {
                        warn!("relay_serial_input: serial port {read_serial:?} not attached, skipping");
                        continue;
                    };
                    let Some(relay) = relays.get(&relay_to).cloned() else {
                        warn!("relay_serial_input: relay {relay_to:?} not declared, skipping");
                        continue;
                    };
                    serial::spawn_line_reader(read_serial.clone(), path, baud, move |line: Bytes| {
                        relay.put(line);
                    });
                }
                TaskDef::WriteQueueToSerial { read_queue, write_serial } => {
                    let Some((path, baud)) = serial_paths.get(&write_serial).cloned() else {
                        warn!("write_queue_to_serial: serial port {write_serial:?} not attached, skipping");
                        continue;
                    };
                    let Some(rx) = queue_rxs.remove(&read_queue) else {
                        warn!("write_queue_to_serial: queue {read_queue:?} not declared, skipping");
                        continue;
                    };
                    serial::spawn_line_writer(write_serial.clone(), path, baud, rx);
                }
            }
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
            }
            _ = drain(&mut tasks) => {
                warn!("all supervised tasks exited on their own");
            }
        }

        tasks.shutdown().await;
        Ok(())
    }
}

async fn drain(tasks: &mut JoinSet<Result<()>>) {
    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("supervised task returned an error: {e}"),
            Err(e) => warn!("supervised task panicked or was cancelled: {e}"),
        }
    }
}
