//! Periodic JSON-lines logging and `current_data` mirroring.
//!
//! Every `interval` the logger appends one delta record (only the keys
//! that changed since the previous tick) to the current run's log file;
//! every `snapshot_every`-th record is preceded by a full snapshot and
//! the heal/pitch extremes are reset, matching `log()`'s `down_count`
//! cycle in the original.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use log::warn;
use serde_json::{json, Value};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::command::CommandStore;
use crate::state::{BoatKey, BoatState, Scalar};

const ERROR_FREE_DEFAULT_HEAL: i64 = -90;
const ERROR_FREE_DEFAULT_HEAL_MIN: i64 = 90;

fn scalar_to_json(value: &Scalar) -> Value {
    match value {
        Scalar::Int(i) => json!(i),
        Scalar::Float(f) => json!(f),
        Scalar::Text(s) => json!(s),
    }
}

fn snapshot_to_json(snapshot: &HashMap<BoatKey, Scalar>) -> serde_json::Map<String, Value> {
    let mut map = serde_json::Map::new();
    for (k, v) in snapshot {
        map.insert(k.as_str().to_string(), scalar_to_json(v));
    }
    map
}

/// Reads the last run id from `log_dir/latest.txt`, increments it, and
/// writes the new value back — matching the original's read-truncate-
/// write `AIOFile` dance.
async fn next_run_id(log_dir: &Path) -> std::io::Result<u64> {
    let path = log_dir.join("latest.txt");
    let mut contents = String::new();
    let existing = OpenOptions::new().read(true).write(true).create(true).open(&path).await;
    let id = match existing {
        Ok(mut f) => {
            f.read_to_string(&mut contents).await?;
            let id = contents.trim().parse::<u64>().unwrap_or(0) + 1;
            f.set_len(0).await?;
            use std::io::SeekFrom;
            tokio::io::AsyncSeekExt::seek(&mut f, SeekFrom::Start(0)).await?;
            f.write_all(id.to_string().as_bytes()).await?;
            f.sync_all().await?;
            id
        }
        Err(e) => return Err(e),
    };
    Ok(id)
}

fn reset_extremes(state: &BoatState) {
    state.set(BoatKey::MaxHeal, Scalar::Int(ERROR_FREE_DEFAULT_HEAL));
    state.set(BoatKey::MinHeal, Scalar::Int(ERROR_FREE_DEFAULT_HEAL_MIN));
    state.set(BoatKey::MaxPitch, Scalar::Int(ERROR_FREE_DEFAULT_HEAL));
    state.set(BoatKey::MinPitch, Scalar::Int(ERROR_FREE_DEFAULT_HEAL_MIN));
    state.delete(BoatKey::Error);
}

/// Runs forever, appending delta/snapshot records to `log_dir` and
/// mirroring the full state to the command store's `current_data` hash.
pub async fn run(
    state: BoatState,
    command_store: Arc<dyn CommandStore>,
    log_dir: PathBuf,
    interval: std::time::Duration,
    snapshot_every: u32,
) {
    if let Err(e) = tokio::fs::create_dir_all(&log_dir).await {
        warn!("logger: failed to create log dir {}: {e}", log_dir.display());
        return;
    }

    let run_id = match next_run_id(&log_dir).await {
        Ok(id) => id,
        Err(e) => {
            warn!("logger: failed to read/increment latest.txt: {e}");
            return;
        }
    };

    reset_extremes(&state);
    let mut previous = state.snapshot();

    let log_path = log_dir.join(format!("logv2_{run_id}.txt"));
    let mut lines: Vec<String> = vec![serde_json::to_string(&snapshot_to_json(&previous)).unwrap()];

    let start = Instant::now();
    let mut count: u64 = 0;
    let mut down_count = snapshot_every;

    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // consume the immediate first tick

    loop {
        ticker.tick().await;
        count += 1;

        let current = state.snapshot();
        let mut delta = serde_json::Map::new();
        delta.insert("count".to_string(), json!(count));
        delta.insert("lapse".to_string(), json!((start.elapsed().as_secs_f64() * 10.0).round() / 10.0));
        for (key, value) in &current {
            if previous.get(key) != Some(value) {
                delta.insert(key.as_str().to_string(), scalar_to_json(value));
            }
        }
        lines.push(serde_json::to_string(&Value::Object(delta)).unwrap());
        previous = current.clone();

        down_count -= 1;
        if down_count == 0 {
            if let Err(e) = flush_log(&log_path, &lines).await {
                warn!("logger: failed to write {}: {e}", log_path.display());
            }
            reset_extremes(&state);
            let snapshot_after_reset = state.snapshot();
            lines = vec![
                String::new(),
                serde_json::to_string(&snapshot_to_json(&snapshot_after_reset)).unwrap(),
            ];
            previous = snapshot_after_reset;
            down_count = snapshot_every;
        }

        let mirrored = state.snapshot();
        if !mirrored.is_empty() {
            if let Err(e) = command_store.write_current_data(&mirrored).await {
                warn!("logger: failed to mirror current_data: {e}");
            }
        }
    }
}

async fn flush_log(path: &Path, lines: &[String]) -> std::io::Result<()> {
    let mut file = File::options().append(true).create(true).open(path).await?;
    file.write_all(lines.join(",\n").as_bytes()).await?;
    file.sync_all().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::NullCommandStore;

    #[tokio::test]
    async fn next_run_id_increments_across_calls() {
        let dir = std::env::temp_dir().join(format!("helmsman-logger-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let first = next_run_id(&dir).await.unwrap();
        let second = next_run_id(&dir).await.unwrap();
        assert_eq!(second, first + 1);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[test]
    fn reset_extremes_sets_documented_defaults() {
        let state = BoatState::new();
        state.set(BoatKey::MaxHeal, Scalar::Int(12));
        state.set(BoatKey::MinHeal, Scalar::Int(-3));
        state.set(BoatKey::Error, Scalar::Text("boom".to_string()));
        reset_extremes(&state);
        assert_eq!(state.get(BoatKey::MaxHeal).unwrap().as_i64(), Some(-90));
        assert_eq!(state.get(BoatKey::MinHeal).unwrap().as_i64(), Some(90));
        assert!(state.get(BoatKey::Error).is_none());
    }

    #[test]
    fn scalar_to_json_round_trips_each_variant() {
        assert_eq!(scalar_to_json(&Scalar::Int(5)), json!(5));
        assert_eq!(scalar_to_json(&Scalar::Float(1.5)), json!(1.5));
        assert_eq!(scalar_to_json(&Scalar::Text("x".to_string())), json!("x"));
    }

    #[tokio::test]
    async fn write_current_data_mirror_round_trips_through_a_null_store() {
        let store = NullCommandStore::default();
        let state = BoatState::new();
        state.set(BoatKey::Power, Scalar::Int(42));
        store.write_current_data(&state.snapshot()).await.unwrap();
    }
}
