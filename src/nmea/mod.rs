//! NMEA-0183 sentence decoding: turns one `$...*HH` line into a handful of
//! `BoatState` writes.

mod format;
mod schema;

use crate::error::{HelmError, Result};
use crate::state::{BoatKey, BoatState, Scalar};

/// Decode one line and apply it to `state`.
///
/// `mag_var` carries the last-known magnetic variation across calls (the
/// decoder needs it to convert `x.x,T` magnetic bearings to true, and
/// updates it from whatever this sentence just wrote, same as the
/// original reader loop re-reading `boat_data['mag_var']` after every
/// line). A malformed field does not propagate as an error to the
/// caller: it is recorded into `BoatState["error"]` and the sentence is
/// otherwise discarded, so one bad line never interrupts the stream.
pub fn decode_sentence(raw: &str, state: &BoatState, mag_var: &mut f64) -> Result<()> {
    let raw = raw.trim_end_matches(['\r', '\n']);
    if raw.len() <= 9 {
        return Ok(());
    }
    let code = &raw[3..6];
    let Some(var_names) = schema::sentence_schema(code) else {
        return Ok(());
    };

    let mut fields: Vec<&str> = raw[7..].split(',').collect();
    if let Some(last) = fields.last().copied() {
        if last.len() >= 3 && last.as_bytes()[last.len() - 3] == b'*' {
            let idx = fields.len() - 1;
            fields[idx] = &last[..last.len() - 3];
        }
    }

    let mut cursor = 0usize;
    let mut decoded: Vec<(BoatKey, Scalar)> = Vec::new();
    let mut schema_keys: Vec<BoatKey> = Vec::new();

    for name in var_names {
        if name.is_empty() {
            cursor += 1;
            continue;
        }
        let var = schema::var_def(name).expect("sentence schema references an undefined variable");
        let count = var.format.field_count();
        if cursor + count > fields.len() {
            return Ok(record_parse_error(
                state,
                code,
                raw,
                format!("sentence has too few fields for variable {name:?}"),
            ));
        }
        let slice = &fields[cursor..cursor + count];
        cursor += count;
        schema_keys.push(var.key);

        match format::decode_field(var.format, slice, *mag_var) {
            Ok(Some(value)) => decoded.push((var.key, value)),
            Ok(None) => {}
            Err(reason) => return Ok(record_parse_error(state, code, raw, reason)),
        }
    }

    let status = decoded
        .iter()
        .find(|(k, _)| *k == BoatKey::Status)
        .and_then(|(_, v)| v.as_text())
        .unwrap_or("A")
        .to_string();

    if status == "A" {
        for (key, value) in decoded {
            state.set(key, value);
        }
    } else {
        for (key, value) in &decoded {
            if matches!(key, BoatKey::Time | BoatKey::Date | BoatKey::Status) {
                state.set(*key, value.clone());
            }
        }
        for key in schema_keys {
            if !matches!(key, BoatKey::Time | BoatKey::Date | BoatKey::Status) {
                state.delete(key);
            }
        }
    }

    if let Some(v) = state.get(BoatKey::MagVar).and_then(|s| s.as_f64()) {
        *mag_var = v;
    }

    Ok(())
}

fn record_parse_error(state: &BoatState, code: &str, raw: &str, reason: String) {
    let err = HelmError::ParseError {
        code: code.to_string(),
        raw: raw.to_string(),
        reason,
    };
    state.set(BoatKey::Error, Scalar::Text(err.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rmc_with_valid_fix_populates_state() {
        let state = BoatState::new();
        let mut mag_var = 0.0;
        decode_sentence(
            "$GPRMC,110910.59,A,5047.3986,N,00054.6007,W,0.08,0.19,150920,0.24,W,D,V*75",
            &state,
            &mut mag_var,
        )
        .unwrap();

        assert_eq!(state.get(BoatKey::Time).unwrap().as_text().unwrap(), "11:09:10.590");
        assert_eq!(state.get(BoatKey::Status).unwrap().as_text().unwrap(), "A");
        assert!((state.get(BoatKey::Lat).unwrap().as_f64().unwrap() - 50.78997667).abs() < 1e-6);
        assert!((state.get(BoatKey::Long).unwrap().as_f64().unwrap() - (-0.91001167)).abs() < 1e-6);
        assert_eq!(state.get(BoatKey::Sog).unwrap().as_f64(), Some(0.08));
        assert_eq!(state.get(BoatKey::Tmg).unwrap().as_f64(), Some(0.19));
        assert_eq!(state.get(BoatKey::Date).unwrap().as_text().unwrap(), "2020-09-15");
        assert_eq!(state.get(BoatKey::MagVar).unwrap().as_f64(), Some(-0.24));
        assert_eq!(mag_var, -0.24);
    }

    #[test]
    fn hdm_is_never_converted_from_magnetic() {
        let state = BoatState::new();
        let mut mag_var = 5.0;
        decode_sentence("$HCHDM,172.5,M*285", &state, &mut mag_var).unwrap();
        assert_eq!(state.get(BoatKey::Hdm).unwrap().as_f64(), Some(172.5));
    }

    #[test]
    fn apb_true_flagged_bearings_pass_through_as_raw_text() {
        let state = BoatState::new();
        let mut mag_var = 5.0;
        decode_sentence("$GPAPB,A,A,5,L,N,V,V,359.,T,1,359.1,T,6,T,A*79", &state, &mut mag_var).unwrap();

        assert_eq!(state.get(BoatKey::Status).unwrap().as_text().unwrap(), "A");
        assert_eq!(state.get(BoatKey::Xte).unwrap().as_f64(), Some(-5.0));
        assert_eq!(state.get(BoatKey::XteUnits).unwrap().as_text().unwrap(), "N");
        assert_eq!(state.get(BoatKey::ACir).unwrap().as_text().unwrap(), "V");
        assert_eq!(state.get(BoatKey::APer).unwrap().as_text().unwrap(), "V");
        assert_eq!(state.get(BoatKey::Bod).unwrap().as_text().unwrap(), "359.");
        assert_eq!(state.get(BoatKey::Did).unwrap().as_text().unwrap(), "1");
        assert_eq!(state.get(BoatKey::Bpd).unwrap().as_text().unwrap(), "359.1");
        assert_eq!(state.get(BoatKey::HtsDecoded).unwrap().as_text().unwrap(), "6");
    }

    #[test]
    fn status_v_clears_stale_nav_keys_but_keeps_time_date_status() {
        let state = BoatState::new();
        let mut mag_var = 0.0;
        decode_sentence(
            "$GPRMC,110910.59,A,5047.3986,N,00054.6007,W,0.08,0.19,150920,0.24,W,D,V*75",
            &state,
            &mut mag_var,
        )
        .unwrap();

        decode_sentence("$GPRMC,110910.59,V,,,,,,,150920,,*HH", &state, &mut mag_var).unwrap();

        assert_eq!(state.get(BoatKey::Time).unwrap().as_text().unwrap(), "11:09:10.590");
        assert_eq!(state.get(BoatKey::Date).unwrap().as_text().unwrap(), "2020-09-15");
        assert_eq!(state.get(BoatKey::Status).unwrap().as_text().unwrap(), "V");
        assert_eq!(state.get(BoatKey::Lat), None);
        assert_eq!(state.get(BoatKey::Long), None);
        assert_eq!(state.get(BoatKey::Sog), None);
        assert_eq!(state.get(BoatKey::Tmg), None);
        assert_eq!(state.get(BoatKey::MagVar), None);
    }

    #[test]
    fn unknown_sentence_code_is_ignored() {
        let state = BoatState::new();
        let mut mag_var = 0.0;
        decode_sentence("$GPXYZ,1,2,3*00", &state, &mut mag_var).unwrap();
        assert_eq!(state.snapshot().len(), 0);
    }

    #[test]
    fn short_sentence_is_ignored() {
        let state = BoatState::new();
        let mut mag_var = 0.0;
        decode_sentence("$GPRMC", &state, &mut mag_var).unwrap();
        assert_eq!(state.snapshot().len(), 0);
    }

    #[test]
    fn malformed_field_records_error_and_leaves_state_untouched() {
        let state = BoatState::new();
        let mut mag_var = 0.0;
        decode_sentence("$GPRMC,notatime,A,5047.3986,N,00054.6007,W,0.08,0.19,150920,0.24,W,D,V*75", &state, &mut mag_var)
            .unwrap();
        assert!(state.get(BoatKey::Error).is_some());
        assert_eq!(state.get(BoatKey::Time), None);
    }
}
