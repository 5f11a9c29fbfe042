//! Static tables: which sentence codes are recognised, which variables
//! each one carries, and how each variable's raw fields are decoded.
//!
//! Replaces the original's two dynamically-built dicts
//! (`sentences`, `def_vars`) with `&'static` slices resolved by linear
//! scan — there are only a handful of entries, so a `match`/`find` beats
//! reaching for a `HashMap` built at startup.

use crate::nmea::format::FieldFormat;
use crate::state::BoatKey;

/// One sentence-schema entry: the variable name to extract, or `""` to
/// skip exactly one raw field without storing anything.
pub type SentenceSchema = &'static [&'static str];

/// `(field_count, format, boat_key)` for one variable name.
pub struct VarDef {
    pub format: FieldFormat,
    pub key: BoatKey,
}

pub fn sentence_schema(code: &str) -> Option<SentenceSchema> {
    Some(match code {
        "RMC" => &["time", "status", "lat", "long", "sog", "tmg", "date", "mag_var"],
        "ZDA" => &["datetime"],
        "APB" => &["status", "", "xte", "xte_units", "acir", "aper", "bod", "did", "bpd", "hts"],
        "HDG" => &["", "", "", "mag_var"],
        "HDM" => &["hdm"],
        "DPT" => &["dbt", "toff"],
        "VHW" => &["", "", "", "", "stw"],
        "VLW" => &["", "", "dw"],
        _ => return None,
    })
}

pub fn var_def(name: &str) -> Option<VarDef> {
    use FieldFormat::*;
    Some(match name {
        "time" => VarDef { format: HhMmSs, key: BoatKey::Time },
        "status" => VarDef { format: Status, key: BoatKey::Status },
        "lat" => VarDef { format: Lat, key: BoatKey::Lat },
        "long" => VarDef { format: Lon, key: BoatKey::Long },
        "sog" => VarDef { format: Float, key: BoatKey::Sog },
        "tmg" => VarDef { format: Float, key: BoatKey::Tmg },
        "date" => VarDef { format: DdMmYy, key: BoatKey::Date },
        "mag_var" => VarDef { format: SignedEw, key: BoatKey::MagVar },
        "datetime" => VarDef { format: DateTime, key: BoatKey::DateTime },
        "xte" => VarDef { format: SignedRl, key: BoatKey::Xte },
        "xte_units" => VarDef { format: Status, key: BoatKey::XteUnits },
        "acir" => VarDef { format: Status, key: BoatKey::ACir },
        "aper" => VarDef { format: Status, key: BoatKey::APer },
        "bod" => VarDef { format: TrueBearing, key: BoatKey::Bod },
        "did" => VarDef { format: Raw, key: BoatKey::Did },
        "bpd" => VarDef { format: TrueBearing, key: BoatKey::Bpd },
        "hts" => VarDef { format: TrueBearing, key: BoatKey::HtsDecoded },
        "hdm" => VarDef { format: Float, key: BoatKey::Hdm },
        "dbt" => VarDef { format: Float, key: BoatKey::Dbt },
        "toff" => VarDef { format: Float, key: BoatKey::Toff },
        "stw" => VarDef { format: Float, key: BoatKey::Stw },
        "dw" => VarDef { format: Float, key: BoatKey::Dw },
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_schema_entry_resolves_to_a_var_def() {
        for code in ["RMC", "ZDA", "APB", "HDG", "HDM", "DPT", "VHW", "VLW"] {
            for name in sentence_schema(code).unwrap() {
                if !name.is_empty() {
                    assert!(var_def(name).is_some(), "{code} references unknown var {name}");
                }
            }
        }
    }

    #[test]
    fn unknown_code_has_no_schema() {
        assert!(sentence_schema("XYZ").is_none());
    }
}
