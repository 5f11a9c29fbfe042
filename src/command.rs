//! The external command channel: operator intent comes in through a
//! `helm` hash in the command store, and the autopilot mirrors its own
//! state back out through a `current_data` hash (see `logger.rs`).

use std::collections::HashMap;

use async_trait::async_trait;
use log::warn;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::{HelmError, Result};
use crate::state::{BoatKey, Scalar};

/// A snapshot of the `helm` hash, with every recognised field resolved to
/// its typed default.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HelmCommand {
    pub auto_mode: i64,
    pub compass_mode: i64,
    pub hts: Option<i64>,
    pub gain: Option<i64>,
    pub tsf: Option<i64>,
    pub drive: Option<i64>,
    pub base_duty: Option<i64>,
}

#[async_trait]
pub trait CommandStore: Send + Sync {
    async fn read_helm(&self) -> Result<HelmCommand>;
    /// Writes a single field back, used to clear one-shot flags (`auto_mode`) to 0.
    async fn write_helm_field(&self, field: &str, value: i64) -> Result<()>;
    async fn write_current_data(&self, snapshot: &HashMap<BoatKey, Scalar>) -> Result<()>;
}

/// Lets `Arc<dyn CommandStore>` stand in for `CommandStore` itself, so the
/// supervisor can hand the same store to both the autopilot and the logger
/// without committing either task to a concrete backend type.
#[async_trait]
impl CommandStore for std::sync::Arc<dyn CommandStore> {
    async fn read_helm(&self) -> Result<HelmCommand> {
        (**self).read_helm().await
    }

    async fn write_helm_field(&self, field: &str, value: i64) -> Result<()> {
        (**self).write_helm_field(field, value).await
    }

    async fn write_current_data(&self, snapshot: &HashMap<BoatKey, Scalar>) -> Result<()> {
        (**self).write_current_data(snapshot).await
    }
}

/// `redis`-backed implementation: the direct analogue of the original's
/// `aioredis` hash access.
pub struct RedisCommandStore {
    conn: ConnectionManager,
}

impl RedisCommandStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(HelmError::Redis)?;
        let conn = client.get_connection_manager().await.map_err(HelmError::Redis)?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CommandStore for RedisCommandStore {
    async fn read_helm(&self) -> Result<HelmCommand> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall("helm").await.map_err(|e| {
            warn!("command store read failed: {e}");
            HelmError::CommandStoreDisconnected(e.to_string())
        })?;

        let get_i64 = |k: &str| fields.get(k).and_then(|v| v.parse::<i64>().ok());

        Ok(HelmCommand {
            auto_mode: get_i64("auto_mode").unwrap_or(0),
            compass_mode: get_i64("compass_mode").unwrap_or(1),
            hts: get_i64("hts"),
            gain: get_i64("gain"),
            tsf: get_i64("tsf"),
            drive: get_i64("drive"),
            base_duty: get_i64("base_duty"),
        })
    }

    async fn write_helm_field(&self, field: &str, value: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>("helm", field, value)
            .await
            .map_err(|e| HelmError::CommandStoreDisconnected(e.to_string()))
    }

    async fn write_current_data(&self, snapshot: &HashMap<BoatKey, Scalar>) -> Result<()> {
        let mut conn = self.conn.clone();
        let pairs: Vec<(String, String)> = snapshot
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        if pairs.is_empty() {
            return Ok(());
        }
        conn.hset_multiple::<_, _, _, ()>("current_data", &pairs)
            .await
            .map_err(|e| HelmError::CommandStoreDisconnected(e.to_string()))
    }
}

/// In-memory double used in tests and as a last-resort fallback when no
/// command store is configured: `auto_mode` always reads back 0, every
/// other field keeps whatever was last written.
#[derive(Default)]
pub struct NullCommandStore {
    helm: std::sync::Mutex<HelmCommand>,
}

#[async_trait]
impl CommandStore for NullCommandStore {
    async fn read_helm(&self) -> Result<HelmCommand> {
        Ok(*self.helm.lock().unwrap())
    }

    async fn write_helm_field(&self, field: &str, value: i64) -> Result<()> {
        let mut helm = self.helm.lock().unwrap();
        match field {
            "auto_mode" => helm.auto_mode = value,
            "compass_mode" => helm.compass_mode = value,
            "hts" => helm.hts = Some(value),
            "gain" => helm.gain = Some(value),
            "tsf" => helm.tsf = Some(value),
            "drive" => helm.drive = Some(value),
            "base_duty" => helm.base_duty = Some(value),
            other => return Err(HelmError::Config(format!("unknown helm field {other:?}"))),
        }
        Ok(())
    }

    async fn write_current_data(&self, _snapshot: &HashMap<BoatKey, Scalar>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_store_defaults_auto_mode_to_zero() {
        let store = NullCommandStore::default();
        let helm = store.read_helm().await.unwrap();
        assert_eq!(helm.auto_mode, 0);
        assert_eq!(helm.compass_mode, 0);
    }

    #[tokio::test]
    async fn null_store_round_trips_written_fields() {
        let store = NullCommandStore::default();
        store.write_helm_field("auto_mode", 2).await.unwrap();
        store.write_helm_field("gain", 324).await.unwrap();
        let helm = store.read_helm().await.unwrap();
        assert_eq!(helm.auto_mode, 2);
        assert_eq!(helm.gain, Some(324));
    }

    #[tokio::test]
    async fn null_store_rejects_unknown_field() {
        let store = NullCommandStore::default();
        assert!(store.write_helm_field("nonsense", 1).await.is_err());
    }
}
