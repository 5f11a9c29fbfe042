//! Helmsman configuration file parser.
//!
//! Scalar settings use a flat key=value format; structured settings that
//! would otherwise be native dict/list literals (USB device matchers,
//! serial port table, relay table, queue list, task list) are embedded
//! as JSON blocks, one per recognised key.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{HelmError, Result};
use crate::usb::DeviceMatch;

const DEFAULT_UDP_PORT: u16 = 8011;
const DEFAULT_SENSOR_WARMUP_SECS: u64 = 15;
const DEFAULT_TICK_INTERVAL_MS: u64 = 500;
const DEFAULT_LOG_INTERVAL_SECS: u64 = 6;
const DEFAULT_LOG_SNAPSHOT_EVERY: u32 = 10;

/// One entry of the `serial_ports` table: the logical name other tasks
/// address this device by, and the baud rate to configure it at.
#[derive(Debug, Clone, Deserialize)]
pub struct SerialPortDef {
    pub name: String,
    pub baud: u32,
}

/// One entry of the `tasks` list, resolved from its raw `{task, kwargs}`
/// shape into a typed variant.
#[derive(Debug, Clone)]
pub enum TaskDef {
    AutoHelm,
    Log,
    UdpSender {
        read_queue: String,
        /// Falls back to the top-level `udp_ip`/`udp_port` settings when absent.
        ip: Option<String>,
        port: Option<u16>,
        relays_writing_udp: Vec<String>,
    },
    NmeaReader {
        read_serial: String,
        relay_to: String,
    },
    RelaySerialInput {
        read_serial: String,
        relay_to: String,
    },
    WriteQueueToSerial {
        read_queue: String,
        write_serial: String,
    },
}

#[derive(Debug, Deserialize)]
struct RawTaskDef {
    task: String,
    #[serde(default)]
    kwargs: serde_json::Value,
}

impl TaskDef {
    fn from_raw(raw: RawTaskDef) -> Result<Self> {
        let kwargs = raw.kwargs;
        let field = |name: &str| -> Result<String> {
            kwargs
                .get(name)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| HelmError::Config(format!("task {:?} missing kwarg {name:?}", raw.task)))
        };

        Ok(match raw.task.as_str() {
            "auto_helm" => TaskDef::AutoHelm,
            "log" => TaskDef::Log,
            "udp_sender" => TaskDef::UdpSender {
                read_queue: field("read_queue")?,
                ip: kwargs.get("ip").and_then(|v| v.as_str()).map(str::to_string),
                port: kwargs.get("port").and_then(|v| v.as_u64()).map(|p| p as u16),
                relays_writing_udp: kwargs
                    .get("relays_writing_udp")
                    .and_then(|v| v.as_array())
                    .map(|a| a.iter().filter_map(|x| x.as_str().map(str::to_string)).collect())
                    .unwrap_or_default(),
            },
            "nmea_reader" => TaskDef::NmeaReader {
                read_serial: field("read_serial")?,
                relay_to: field("relay_to")?,
            },
            "relay_serial_input" => TaskDef::RelaySerialInput {
                read_serial: field("read_serial")?,
                relay_to: field("relay_to")?,
            },
            "write_queue_to_serial" => TaskDef::WriteQueueToSerial {
                read_queue: field("read_queue")?,
                write_serial: field("write_serial")?,
            },
            other => return Err(HelmError::Config(format!("unknown task type {other:?}"))),
        })
    }
}

/// Full helmsman configuration.
#[derive(Debug, Clone)]
pub struct HelmsmanConfig {
    /// Empty disables the command store; a [`crate::command::NullCommandStore`]
    /// is substituted, intended for bench testing only.
    pub redis_url: String,
    pub log_dir: PathBuf,
    pub udp_ip: String,
    pub udp_port: u16,
    pub sensor_warmup_secs: u64,
    pub tick_interval_ms: u64,
    pub log_interval_secs: u64,
    pub log_snapshot_every: u32,
    pub usb_devices: HashMap<String, DeviceMatch>,
    pub serial_ports: HashMap<String, SerialPortDef>,
    pub distribution_queues: Vec<String>,
    pub relays: HashMap<String, Vec<String>>,
    pub tasks: Vec<TaskDef>,
}

impl Default for HelmsmanConfig {
    fn default() -> Self {
        Self {
            redis_url: String::new(),
            log_dir: PathBuf::from("./logs"),
            udp_ip: "192.168.0.100".to_string(),
            udp_port: DEFAULT_UDP_PORT,
            sensor_warmup_secs: DEFAULT_SENSOR_WARMUP_SECS,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            log_interval_secs: DEFAULT_LOG_INTERVAL_SECS,
            log_snapshot_every: DEFAULT_LOG_SNAPSHOT_EVERY,
            usb_devices: HashMap::new(),
            serial_ports: HashMap::new(),
            distribution_queues: Vec::new(),
            relays: HashMap::new(),
            tasks: Vec::new(),
        }
    }
}

/// Parse `path` as a `helmsman.conf` key=value configuration file.
pub fn load_config(path: &Path) -> Result<HelmsmanConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| HelmError::Config(format!("cannot read {}: {e}", path.display())))?;
    let mut cfg = HelmsmanConfig::default();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.splitn(2, '=');
        let key = match parts.next() {
            Some(k) => k.trim().to_ascii_lowercase(),
            None => continue,
        };
        let val = match parts.next() {
            Some(v) => v.trim().to_string(),
            None => continue,
        };
        if val.is_empty() {
            continue;
        }

        match key.as_str() {
            "redis_url" => cfg.redis_url = val,
            "log_dir" => cfg.log_dir = PathBuf::from(&val),
            "udp_ip" => cfg.udp_ip = val,
            "udp_port" => cfg.udp_port = val.parse().unwrap_or(DEFAULT_UDP_PORT),
            "sensor_warmup_secs" => cfg.sensor_warmup_secs = val.parse().unwrap_or(DEFAULT_SENSOR_WARMUP_SECS),
            "tick_interval_ms" => cfg.tick_interval_ms = val.parse().unwrap_or(DEFAULT_TICK_INTERVAL_MS),
            "log_interval_secs" => cfg.log_interval_secs = val.parse().unwrap_or(DEFAULT_LOG_INTERVAL_SECS),
            "log_snapshot_every" => cfg.log_snapshot_every = val.parse().unwrap_or(DEFAULT_LOG_SNAPSHOT_EVERY),
            "usb_devices" => {
                cfg.usb_devices = serde_json::from_str(&val).map_err(HelmError::Json)?;
            }
            "serial_ports" => {
                cfg.serial_ports = serde_json::from_str(&val).map_err(HelmError::Json)?;
            }
            "distribution_queues" => {
                cfg.distribution_queues = serde_json::from_str(&val).map_err(HelmError::Json)?;
            }
            "relays" => {
                cfg.relays = serde_json::from_str(&val).map_err(HelmError::Json)?;
            }
            "tasks" => {
                let raw: Vec<RawTaskDef> = serde_json::from_str(&val).map_err(HelmError::Json)?;
                cfg.tasks = raw.into_iter().map(TaskDef::from_raw).collect::<Result<Vec<_>>>()?;
            }
            _ => {}
        }
    }

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_representative_config_file() {
        let dir = std::env::temp_dir().join(format!("helmsman-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("helmsman.conf");
        std::fs::write(
            &path,
            r#"
redis_url = redis://localhost
log_dir = ./logs
udp_ip = 192.168.0.100
udp_port = 8011
usb_devices = {"gps_dongle": {"ID_VENDOR": "Silicon_Labs"}}
serial_ports = {"gps_dongle": {"name": "blue_next_gps_dongle", "baud": 9600}}
distribution_queues = ["q_to_2000", "q_udp"]
relays = {"to_2000": ["q_to_2000", "q_udp"]}
tasks = [{"task": "auto_helm"}, {"task": "log"}, {"task": "udp_sender", "kwargs": {"read_queue": "q_udp", "ip": "192.168.0.100", "port": 8011, "relays_writing_udp": ["to_2000"]}}]
"#,
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.redis_url, "redis://localhost");
        assert_eq!(cfg.serial_ports.get("gps_dongle").unwrap().baud, 9600);
        assert_eq!(cfg.distribution_queues, vec!["q_to_2000", "q_udp"]);
        assert_eq!(cfg.tasks.len(), 3);
        assert!(matches!(cfg.tasks[0], TaskDef::AutoHelm));
        assert!(matches!(cfg.tasks[1], TaskDef::Log));
        match &cfg.tasks[2] {
            TaskDef::UdpSender { read_queue, port, relays_writing_udp, .. } => {
                assert_eq!(read_queue, "q_udp");
                assert_eq!(*port, Some(8011));
                assert_eq!(relays_writing_udp, &vec!["to_2000".to_string()]);
            }
            other => panic!("unexpected task: {other:?}"),
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unknown_task_type_is_an_error() {
        let raw: RawTaskDef = serde_json::from_str(r#"{"task": "not_a_real_task"}"#).unwrap();
        assert!(TaskDef::from_raw(raw).is_err());
    }
}
