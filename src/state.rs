//! `BoatState` — the process-wide, last-writer-wins scalar store that the
//! decoder, the autopilot and the logger all read and write.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// A loosely-typed value, mirroring the dynamically-typed Python `boat_data`
/// dict this store replaces.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(v) => Some(*v as f64),
            Scalar::Float(v) => Some(*v),
            Scalar::Text(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(v) => Some(*v),
            Scalar::Float(v) => Some(*v as i64),
            Scalar::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Text(v)
    }
}

/// The closed set of keys the control core and decoder are allowed to touch.
/// Keeping this as an enum (rather than free-form strings) catches typos at
/// compile time the way the Python dict-of-strings never could.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoatKey {
    Compass,
    CompassCal,
    CompassMode,
    HeadDiff,
    MaxHeal,
    MinHeal,
    MaxPitch,
    MinPitch,
    Hts,
    HtsTarget,
    MagVar,
    Hdm,
    AutoHelm,
    Gain,
    Tsf,
    BaseDuty,
    Power,
    Rudder,
    Error,
    // Decoder navigational keys
    Time,
    Status,
    Lat,
    Long,
    Sog,
    Tmg,
    Date,
    DateTime,
    Xte,
    XteUnits,
    ACir,
    APer,
    Bod,
    Did,
    Bpd,
    HtsDecoded,
    Dbt,
    Toff,
    Stw,
    Dw,
}

impl BoatKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoatKey::Compass => "compass",
            BoatKey::CompassCal => "compass_cal",
            BoatKey::CompassMode => "compass_mode",
            BoatKey::HeadDiff => "head_diff",
            BoatKey::MaxHeal => "max_heal",
            BoatKey::MinHeal => "min_heal",
            BoatKey::MaxPitch => "max_pitch",
            BoatKey::MinPitch => "min_pitch",
            BoatKey::Hts => "hts",
            BoatKey::HtsTarget => "hts_target",
            BoatKey::MagVar => "mag_var",
            BoatKey::Hdm => "hdm",
            BoatKey::AutoHelm => "auto_helm",
            BoatKey::Gain => "gain",
            BoatKey::Tsf => "tsf",
            BoatKey::BaseDuty => "base_duty",
            BoatKey::Power => "power",
            BoatKey::Rudder => "rudder",
            BoatKey::Error => "error",
            BoatKey::Time => "time",
            BoatKey::Status => "status",
            BoatKey::Lat => "lat",
            BoatKey::Long => "long",
            BoatKey::Sog => "SOG",
            BoatKey::Tmg => "TMG",
            BoatKey::Date => "date",
            BoatKey::DateTime => "datetime",
            BoatKey::Xte => "XTE",
            BoatKey::XteUnits => "XTE_units",
            BoatKey::ACir => "ACir",
            BoatKey::APer => "APer",
            BoatKey::Bod => "BOD",
            BoatKey::Did => "Did",
            BoatKey::Bpd => "BPD",
            BoatKey::HtsDecoded => "HTS",
            BoatKey::Dbt => "DBT",
            BoatKey::Toff => "TOFF",
            BoatKey::Stw => "STW",
            BoatKey::Dw => "DW",
        }
    }

    pub const ALL: &'static [BoatKey] = &[
        BoatKey::Compass,
        BoatKey::CompassCal,
        BoatKey::CompassMode,
        BoatKey::HeadDiff,
        BoatKey::MaxHeal,
        BoatKey::MinHeal,
        BoatKey::MaxPitch,
        BoatKey::MinPitch,
        BoatKey::Hts,
        BoatKey::HtsTarget,
        BoatKey::MagVar,
        BoatKey::Hdm,
        BoatKey::AutoHelm,
        BoatKey::Gain,
        BoatKey::Tsf,
        BoatKey::BaseDuty,
        BoatKey::Power,
        BoatKey::Rudder,
        BoatKey::Error,
        BoatKey::Time,
        BoatKey::Status,
        BoatKey::Lat,
        BoatKey::Long,
        BoatKey::Sog,
        BoatKey::Tmg,
        BoatKey::Date,
        BoatKey::DateTime,
        BoatKey::Xte,
        BoatKey::XteUnits,
        BoatKey::ACir,
        BoatKey::APer,
        BoatKey::Bod,
        BoatKey::Did,
        BoatKey::Bpd,
        BoatKey::HtsDecoded,
        BoatKey::Dbt,
        BoatKey::Toff,
        BoatKey::Stw,
        BoatKey::Dw,
    ];
}

impl fmt::Display for BoatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseBoatKeyError(pub String);

impl fmt::Display for ParseBoatKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognised boat state key: {}", self.0)
    }
}

impl std::error::Error for ParseBoatKeyError {}

impl FromStr for BoatKey {
    type Err = ParseBoatKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BoatKey::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ParseBoatKeyError(s.to_string()))
    }
}

/// A concurrent, named scalar store with last-writer-wins semantics.
///
/// Readers (the autopilot) and writers (the decoder tasks, the autopilot
/// itself) never coordinate beyond the mutex: a `get` may observe a value
/// from a `set`/`delete` that happened moments ago on another task, and
/// that staleness is an accepted property of the design, not a bug — see
/// the concurrency model in the crate's design notes.
#[derive(Debug, Clone, Default)]
pub struct BoatState {
    inner: Arc<Mutex<HashMap<BoatKey, Scalar>>>,
}

impl BoatState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn get(&self, key: BoatKey) -> Option<Scalar> {
        self.inner.lock().unwrap().get(&key).cloned()
    }

    pub fn set(&self, key: BoatKey, value: Scalar) {
        self.inner.lock().unwrap().insert(key, value);
    }

    pub fn delete(&self, key: BoatKey) {
        self.inner.lock().unwrap().remove(&key);
    }

    /// Take a point-in-time copy of the whole store, for the logger.
    pub fn snapshot(&self) -> HashMap<BoatKey, Scalar> {
        self.inner.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_delete_round_trip() {
        let state = BoatState::new();
        assert_eq!(state.get(BoatKey::Hts), None);
        state.set(BoatKey::Hts, Scalar::Float(123.0));
        assert_eq!(state.get(BoatKey::Hts), Some(Scalar::Float(123.0)));
        state.delete(BoatKey::Hts);
        assert_eq!(state.get(BoatKey::Hts), None);
    }

    #[test]
    fn key_round_trips_through_display_and_from_str() {
        for key in BoatKey::ALL {
            let s = key.to_string();
            assert_eq!(s.parse::<BoatKey>().unwrap(), *key);
        }
    }

    #[test]
    fn clone_shares_the_same_backing_store() {
        let state = BoatState::new();
        let clone = state.clone();
        clone.set(BoatKey::Power, Scalar::Int(42));
        assert_eq!(state.get(BoatKey::Power), Some(Scalar::Int(42)));
    }
}
