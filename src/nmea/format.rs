//! Field-level conversions for a decoded NMEA-0183 sentence.
//!
//! Each [`FieldFormat`] variant consumes a fixed number of raw comma-split
//! fields and produces a [`Scalar`] (or `None` if any consumed field is
//! empty — an empty field nulls the whole variable for this sentence,
//! mirroring `get_nmea_field_value`'s `missing` check).

use chrono::{Duration, NaiveDate};

use crate::state::Scalar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldFormat {
    HhMmSs,
    DdMmYy,
    Lat,
    Lon,
    Float,
    SignedEw,
    SignedRl,
    TrueBearing,
    Status,
    Raw,
    Int,
    DateTime,
}

impl FieldFormat {
    /// Number of raw fields this format consumes.
    pub fn field_count(self) -> usize {
        match self {
            FieldFormat::HhMmSs => 1,
            FieldFormat::DdMmYy => 1,
            FieldFormat::Lat => 2,
            FieldFormat::Lon => 2,
            FieldFormat::Float => 1,
            FieldFormat::SignedEw => 2,
            FieldFormat::SignedRl => 2,
            FieldFormat::TrueBearing => 2,
            FieldFormat::Status => 1,
            FieldFormat::Raw => 1,
            FieldFormat::Int => 1,
            FieldFormat::DateTime => 6,
        }
    }
}

/// Decode one variable's raw fields. `fields.len()` always equals
/// `format.field_count()`; `mag_var` is the running value from *before*
/// this sentence.
pub fn decode_field(format: FieldFormat, fields: &[&str], mag_var: f64) -> Result<Option<Scalar>, String> {
    if fields.iter().any(|f| f.is_empty()) {
        return Ok(None);
    }
    let value = match format {
        FieldFormat::HhMmSs => Scalar::Text(hhmmss(fields[0])?),
        FieldFormat::DdMmYy => Scalar::Text(ddmmyy(fields[0])?),
        FieldFormat::Lat => Scalar::Float(lat(fields[0], fields[1])?),
        FieldFormat::Lon => Scalar::Float(lon(fields[0], fields[1])?),
        FieldFormat::Float => Scalar::Float(parse_f64(fields[0])?),
        FieldFormat::SignedEw => Scalar::Float(signed(fields[0], fields[1], 'E', 'W')?),
        FieldFormat::SignedRl => Scalar::Float(signed(fields[0], fields[1], 'R', 'L')?),
        FieldFormat::TrueBearing => true_bearing(fields[0], fields[1], mag_var)?,
        FieldFormat::Status => Scalar::Text(fields[0].to_string()),
        FieldFormat::Raw => Scalar::Text(fields[0].to_string()),
        FieldFormat::Int => Scalar::Int(fields[0].parse::<i64>().map_err(|e| e.to_string())?),
        FieldFormat::DateTime => Scalar::Text(datetime(fields)?),
    };
    Ok(Some(value))
}

fn parse_f64(field: &str) -> Result<f64, String> {
    field.parse::<f64>().map_err(|_| format!("not a number: {field:?}"))
}

/// `HHMMSS.ss` -> `HH:MM:SS.mmm`, fraction padded right to 6 digits then
/// truncated to milliseconds for display (matches `get_micro_secs`).
fn hhmmss(field: &str) -> Result<String, String> {
    let (whole, frac) = field.split_once('.').unwrap_or((field, ""));
    if whole.len() < 6 {
        return Err(format!("short time field: {field:?}"));
    }
    let hh = &whole[0..2];
    let mm = &whole[2..4];
    let ss = &whole[4..6];
    for part in [hh, mm, ss] {
        part.parse::<u32>().map_err(|_| format!("bad time field: {field:?}"))?;
    }
    let mut padded = frac.to_string();
    while padded.len() < 6 {
        padded.push('0');
    }
    let millis = &padded[0..3];
    Ok(format!("{hh}:{mm}:{ss}.{millis}"))
}

/// `ddmmyy` -> ISO date, with the GPS-week-rollover correction.
fn ddmmyy(field: &str) -> Result<String, String> {
    if field.len() < 6 {
        return Err(format!("short date field: {field:?}"));
    }
    let day: u32 = field[0..2].parse().map_err(|_| format!("bad day: {field:?}"))?;
    let month: u32 = field[2..4].parse().map_err(|_| format!("bad month: {field:?}"))?;
    let mut year: i32 = field[4..6].parse().map_err(|_| format!("bad year: {field:?}"))?;
    if year < 1980 {
        year += 2000;
    }
    let needs_rollover = year < 2020;
    let mut date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| format!("bad date: {field:?}"))?;
    if needs_rollover {
        // GPS week counter (10 bits) rolled over; shift forward by the one
        // rollover epoch assumed to have passed (matches `gps_date`).
        date += Duration::weeks(1024);
    }
    Ok(date.format("%Y-%m-%d").to_string())
}

fn lat(value: &str, hemi: &str) -> Result<f64, String> {
    if value.len() < 2 {
        return Err(format!("short lat field: {value:?}"));
    }
    let deg: f64 = value[0..2].parse().map_err(|_| format!("bad lat degrees: {value:?}"))?;
    let min: f64 = value[2..].parse().map_err(|_| format!("bad lat minutes: {value:?}"))?;
    let magnitude = deg + min / 60.0;
    match hemi {
        "N" => Ok(magnitude),
        "S" => Ok(-magnitude),
        _ => Err(format!("bad lat hemisphere: {hemi:?}")),
    }
}

fn lon(value: &str, hemi: &str) -> Result<f64, String> {
    if value.len() < 3 {
        return Err(format!("short lon field: {value:?}"));
    }
    let deg: f64 = value[0..3].parse().map_err(|_| format!("bad lon degrees: {value:?}"))?;
    let min: f64 = value[3..].parse().map_err(|_| format!("bad lon minutes: {value:?}"))?;
    let magnitude = deg + min / 60.0;
    match hemi {
        "E" => Ok(magnitude),
        "W" => Ok(-magnitude),
        _ => Err(format!("bad lon hemisphere: {hemi:?}")),
    }
}

fn signed(value: &str, flag: &str, pos: char, neg: char) -> Result<f64, String> {
    let magnitude = parse_f64(value)?;
    let flag = flag.chars().next().ok_or_else(|| "empty sign flag".to_string())?;
    if flag == pos {
        Ok(magnitude)
    } else if flag == neg {
        Ok(-magnitude)
    } else {
        Err(format!("bad sign flag: {flag:?}"))
    }
}

/// `x.x,T` — if the flag is `M`, subtract `mag_var` and produce a number;
/// otherwise the value passes through unconverted, as plain text (matches
/// the original decoder, which never casts the value to a float unless it
/// actually performs the magnetic-to-true subtraction).
fn true_bearing(value: &str, flag: &str, mag_var: f64) -> Result<Scalar, String> {
    if flag == "M" {
        let magnitude = parse_f64(value)?;
        Ok(Scalar::Float(magnitude - mag_var))
    } else {
        Ok(Scalar::Text(value.to_string()))
    }
}

fn datetime(fields: &[&str]) -> Result<String, String> {
    let time = hhmmss_full_micros(fields[0])?;
    let day: u32 = fields[1].parse().map_err(|_| format!("bad day: {:?}", fields[1]))?;
    let month: u32 = fields[2].parse().map_err(|_| format!("bad month: {:?}", fields[2]))?;
    let year: i32 = fields[3].parse().map_err(|_| format!("bad year: {:?}", fields[3]))?;
    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| format!("bad date: {fields:?}"))?;
    let tz_h: i32 = fields[4].parse().map_err(|_| format!("bad tz hour: {:?}", fields[4]))?;
    Ok(format!(
        "{}T{}{}{:02}:{:02}",
        date.format("%Y-%m-%d"),
        time,
        if tz_h < 0 { "-" } else { "+" },
        tz_h.abs(),
        fields[5].parse::<u32>().unwrap_or(0),
    ))
}

/// Same decomposition as [`hhmmss`] but keeps the full 6-digit microsecond
/// fraction, matching the `datetime` variable's original `arrow`-based
/// formatting (distinct from the plain `time` variable's millisecond
/// truncation).
fn hhmmss_full_micros(field: &str) -> Result<String, String> {
    let (whole, frac) = field.split_once('.').unwrap_or((field, ""));
    if whole.len() < 6 {
        return Err(format!("short time field: {field:?}"));
    }
    let hh = &whole[0..2];
    let mm = &whole[2..4];
    let ss = &whole[4..6];
    for part in [hh, mm, ss] {
        part.parse::<u32>().map_err(|_| format!("bad time field: {field:?}"))?;
    }
    let mut padded = frac.to_string();
    while padded.len() < 6 {
        padded.push('0');
    }
    Ok(format!("{hh}:{mm}:{ss}.{padded}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hhmmss_truncates_to_milliseconds() {
        assert_eq!(hhmmss("110910.59").unwrap(), "11:09:10.590");
    }

    #[test]
    fn ddmmyy_no_rollover_needed_in_2020() {
        assert_eq!(ddmmyy("150920").unwrap(), "2020-09-15");
    }

    #[test]
    fn lat_north_is_positive() {
        let v = lat("5047.3986", "N").unwrap();
        assert!((v - 50.78997667).abs() < 1e-6);
    }

    #[test]
    fn lon_west_is_negative() {
        let v = lon("00054.6007", "W").unwrap();
        assert!((v - (-0.91001167)).abs() < 1e-6);
    }

    #[test]
    fn signed_rl_left_is_negative() {
        assert_eq!(signed("5", "L", 'R', 'L').unwrap(), -5.0);
    }

    #[test]
    fn true_bearing_true_flag_passes_through_as_text() {
        let v = true_bearing("359.", "T", 5.0).unwrap();
        assert_eq!(v, Scalar::Text("359.".to_string()));
    }

    #[test]
    fn true_bearing_magnetic_flag_subtracts_mag_var() {
        let v = true_bearing("172.5", "M", 5.0).unwrap();
        assert_eq!(v, Scalar::Float(167.5));
    }

    #[test]
    fn empty_field_is_missing_not_an_error() {
        assert_eq!(decode_field(FieldFormat::Float, &[""], 0.0).unwrap(), None);
    }
}
