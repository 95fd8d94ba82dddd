use crate::error::PipelineError;
use chrono::NaiveDateTime;
use csv::StringRecord;
use serde::{Deserialize, Deserializer, Serializer};
use std::{fs, io, path::Path};

/// Format used when writing timestamps back out.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const TIMESTAMP_FORMAT_SPACE: &str = "%Y-%m-%d %H:%M:%S";

/// Converts a not found error to Ok(false)
pub fn path_exists(path: &Path) -> io::Result<bool> {
    match fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Parse a timestamp in either `YYYY-MM-DDTHH:MM:SS` or `YYYY-MM-DD HH:MM:SS` form.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, PipelineError> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT_SPACE))
        .map_err(|_| PipelineError::MalformedTimestamp {
            value: s.to_owned(),
        })
}

/// Hours from `from` to `to`, negative if `to` is earlier.
pub fn hours_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_seconds() as f64 / 3_600.
}

/// Days from `from` to `to`, negative if `to` is earlier.
pub fn days_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_seconds() as f64 / 86_400.
}

/// Round to 3 decimal places, normalizing `-0` to `0`.
pub fn round3(v: f64) -> f64 {
    let out = (v * 1000.).round() / 1000.;
    if out == 0. {
        0.
    } else {
        out
    }
}

/// How every float ends up in an output file.
pub fn fmt_value(v: f64) -> String {
    round3(v).to_string()
}

/// Parse a numeric cell. Empty or non-numeric cells are `None`, they are dropped rather than
/// counted as zero.
pub fn parse_numeric(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Find the position of each named column in a header row (ignoring ASCII case).
pub fn resolve_columns<const N: usize>(
    headers: &StringRecord,
    names: [&str; N],
    file: &Path,
) -> Result<[usize; N], PipelineError> {
    let mut out = [0; N];
    for (slot, name) in out.iter_mut().zip(names) {
        *slot = headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .ok_or_else(|| PipelineError::MissingField {
                column: name.to_owned(),
                file: file.to_owned(),
            })?;
    }
    Ok(out)
}

/// Pull the fields at `positions` out of a record.
pub fn select_fields<'r, const N: usize>(
    record: &'r StringRecord,
    positions: &[usize; N],
) -> Result<[&'r str; N], PipelineError> {
    let mut out = [""; N];
    for (slot, &pos) in out.iter_mut().zip(positions) {
        *slot = record.get(pos).ok_or(PipelineError::IncompleteRow {
            found: record.len(),
            needed: pos + 1,
        })?;
    }
    Ok(out)
}

// Helpers for serde to parse fields with quirks.

/// parse a '1' to `true` and a '0' to `false`
pub fn bool_01<'de, D>(d: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let s: u8 = Deserialize::deserialize(d)?;
    match s {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(Error::custom("expected '0' or '1'")),
    }
}

/// write `true` as '1' and `false` as '0'
pub fn ser_bool_01<S>(v: &bool, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.serialize_u8(u8::from(*v))
}

pub fn header(header: &str) {
    let len = header.len();
    print!("\n{}\n", header);
    for _ in 0..len {
        print!("=");
    }
    println!("\n")
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn timestamps_accept_both_separators() {
        let expected = NaiveDate::from_ymd_opt(2108, 4, 6)
            .unwrap()
            .and_hms_opt(11, 30, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2108-04-06T11:30:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2108-04-06 11:30:00").unwrap(), expected);
    }

    #[test]
    fn bad_timestamp() {
        assert!(matches!(
            parse_timestamp("06/04/2108 11:30"),
            Err(PipelineError::MalformedTimestamp { .. })
        ));
    }

    #[test]
    fn rounding() {
        assert_eq!(round3(1.23456), 1.235);
        assert_eq!(round3(-0.0001), 0.);
        assert_eq!(fmt_value(15.), "15");
        assert_eq!(fmt_value(-0.0004), "0");
        assert_eq!(fmt_value(2.5), "2.5");
    }

    #[test]
    fn numeric_cells() {
        assert_eq!(parse_numeric(" 19 "), Some(19.));
        assert_eq!(parse_numeric(""), None);
        assert_eq!(parse_numeric("1+"), None);
        assert_eq!(parse_numeric("NaN"), None);
    }

    #[test]
    fn columns_resolve_case_insensitively() {
        let headers = StringRecord::from(vec!["HADM_ID", "charttime", "Label"]);
        let cols = resolve_columns(&headers, ["label", "hadm_id"], Path::new("x.csv")).unwrap();
        assert_eq!(cols, [2, 0]);
        let err = resolve_columns(&headers, ["VALUENUM"], Path::new("x.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::MissingField { column, .. } if column == "VALUENUM"));
    }
}
