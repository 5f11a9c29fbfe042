//! Error types for the autopilot/NMEA hub.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HelmError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("task join: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("command store: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("attitude sensor fault: {0}")]
    SensorFault(String),

    #[error("helm actuator fault: {0}")]
    ActuatorFault(String),

    #[error("NMEA parse error in {code} sentence: {reason} ({raw:?})")]
    ParseError {
        code: String,
        raw: String,
        reason: String,
    },

    #[error("command store disconnected: {0}")]
    CommandStoreDisconnected(String),

    #[error("UDP connect failed: {0}")]
    UdpConnectFailed(String),

    #[error("queue cancelled")]
    QueueCancelled,

    #[error("startup: {0}")]
    Startup(String),

    #[error("config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, HelmError>;
