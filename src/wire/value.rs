//! Typed scalar encoding: `CODE + ':' + BYTES(v)`.
//!
//! Mirrors `extended_type2bytes`/`bytes2type` from the original `hein`
//! codec: every scalar carries a one-byte type code so extended-JSON can
//! express types plain JSON can't (typed bytes, tz-aware datetimes).

use crate::error::DecodeError;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// A decoded scalar or container value.
///
/// `Bytes` covers the wire's `Y`/`y`/`s` codes — distinct codes on the
/// wire for Python 2/3 string-type provenance, collapsed onto one Rust
/// arm since that distinction has no meaning outside the original
/// language runtime; this crate still *emits* `Y` for raw-bytes input and
/// accepts all three codes on decode.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Null,
    Bytes(Vec<u8>),
    Unicode(String),
    DateTime(NaiveDateTime, Option<String>),
    Date(NaiveDate),
    Time(NaiveTime, Option<String>),
    List(Vec<Value>),
    Map(Vec<(String, Value)>),
}

const BOOL_CODE: u8 = b'b';
const INT_CODE: u8 = b'i';
const FLOAT_CODE: u8 = b'f';
const NULL_CODE: u8 = b'n';
const BYT_CODE: u8 = b'Y';
const BYTES_CODE: u8 = b'y';
const UNICODE_CODE: u8 = b'u';
const STR_CODE: u8 = b's';
const DT_CODE: u8 = b't';
const DATE_CODE: u8 = b'D';
const TIME_CODE: u8 = b'T';

/// Encodes a scalar as `CODE:BYTES`. Containers are not handled here —
/// see `wire::json` for list/dict recursion.
pub fn encode_scalar(v: &Value) -> Vec<u8> {
    match v {
        Value::Bool(b) => tagged(BOOL_CODE, if *b { b"1" } else { b"0" }),
        Value::Int(i) => tagged(INT_CODE, i.to_string().as_bytes()),
        Value::Float(f) => tagged(FLOAT_CODE, format_float(*f).as_bytes()),
        Value::Null => tagged(NULL_CODE, b""),
        Value::Bytes(b) => tagged(BYT_CODE, b),
        Value::Unicode(s) => tagged(UNICODE_CODE, s.as_bytes()),
        Value::Date(d) => tagged(DATE_CODE, format!("{},{},{}", d.format("%Y"), d.format("%m"), d.format("%d")).as_bytes()),
        Value::Time(t, tz) => tagged(
            TIME_CODE,
            format!(
                "{},{},{},{},{}",
                t.format("%H"),
                t.format("%M"),
                t.format("%S"),
                t.format("%6f").to_string().trim_start_matches('0').to_string(),
                tz.clone().unwrap_or_default()
            )
            .as_bytes(),
        ),
        Value::DateTime(dt, tz) => tagged(
            DT_CODE,
            format!(
                "{},{},{},{},{},{},{},{}",
                dt.format("%Y"),
                dt.format("%m"),
                dt.format("%d"),
                dt.format("%H"),
                dt.format("%M"),
                dt.format("%S"),
                dt.and_utc().timestamp_subsec_micros(),
                tz.clone().unwrap_or_default()
            )
            .as_bytes(),
        ),
        Value::List(_) | Value::Map(_) => {
            // Containers have no scalar wire form; callers must recurse
            // through wire::json instead. Defensive fallback: textual repr.
            tagged(UNICODE_CODE, format!("{:?}", v).as_bytes())
        }
    }
}

fn tagged(code: u8, bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 2);
    out.push(code);
    out.push(super::MAP);
    out.extend_from_slice(bytes);
    out
}

fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.is_finite() {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

/// Decodes a `CODE:BYTES` scalar back into a [`Value`].
pub fn decode_scalar(raw: &[u8]) -> Result<Value, DecodeError> {
    let sep = raw
        .iter()
        .position(|&b| b == super::MAP)
        .ok_or(DecodeError::MalformedJson)?;
    let code = raw[0];
    if sep != 1 {
        return Err(DecodeError::MalformedJson);
    }
    let body = &raw[sep + 1..];
    match code {
        BOOL_CODE => Ok(Value::Bool(body == b"1")),
        INT_CODE => std::str::from_utf8(body)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Value::Int)
            .ok_or(DecodeError::MalformedJson),
        FLOAT_CODE => std::str::from_utf8(body)
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .map(Value::Float)
            .ok_or(DecodeError::MalformedJson),
        NULL_CODE => Ok(Value::Null),
        BYT_CODE | BYTES_CODE | STR_CODE => Ok(Value::Bytes(body.to_vec())),
        UNICODE_CODE => std::str::from_utf8(body)
            .map(|s| Value::Unicode(s.to_string()))
            .map_err(|_| DecodeError::MalformedJson),
        DATE_CODE => decode_date(body),
        TIME_CODE => decode_time(body),
        DT_CODE => decode_datetime(body),
        other => Err(DecodeError::UnknownCode(other)),
    }
}

fn fields(body: &[u8]) -> Result<Vec<String>, DecodeError> {
    std::str::from_utf8(body)
        .map_err(|_| DecodeError::MalformedJson)?
        .split(',')
        .map(|s| Ok(s.to_string()))
        .collect()
}

fn parse_int_or_zero(s: &str) -> Result<i64, DecodeError> {
    if s.is_empty() {
        Ok(0)
    } else {
        s.parse().map_err(|_| DecodeError::MalformedJson)
    }
}

fn decode_date(body: &[u8]) -> Result<Value, DecodeError> {
    let f = fields(body)?;
    if f.len() < 3 {
        return Err(DecodeError::MalformedJson);
    }
    let (y, m, d) = (
        parse_int_or_zero(&f[0])? as i32,
        parse_int_or_zero(&f[1])? as u32,
        parse_int_or_zero(&f[2])? as u32,
    );
    NaiveDate::from_ymd_opt(y, m.max(1), d.max(1))
        .map(Value::Date)
        .ok_or(DecodeError::MalformedJson)
}

fn decode_time(body: &[u8]) -> Result<Value, DecodeError> {
    let mut f = fields(body)?;
    if f.len() < 4 {
        return Err(DecodeError::MalformedJson);
    }
    let tz = f.pop().filter(|s| !s.is_empty());
    let (h, mi, s, us) = (
        parse_int_or_zero(&f[0])? as u32,
        parse_int_or_zero(&f[1])? as u32,
        parse_int_or_zero(&f[2])? as u32,
        parse_int_or_zero(&f[3])? as u32,
    );
    let time = NaiveTime::from_hms_micro_opt(h, mi, s, us).ok_or(DecodeError::MalformedJson)?;
    check_timezone(&tz)?;
    Ok(Value::Time(time, tz))
}

fn decode_datetime(body: &[u8]) -> Result<Value, DecodeError> {
    let mut f = fields(body)?;
    if f.len() < 7 {
        return Err(DecodeError::MalformedJson);
    }
    let tz = f.pop().filter(|s| !s.is_empty());
    let (y, mo, d, h, mi, s, us) = (
        parse_int_or_zero(&f[0])? as i32,
        parse_int_or_zero(&f[1])? as u32,
        parse_int_or_zero(&f[2])? as u32,
        parse_int_or_zero(&f[3])? as u32,
        parse_int_or_zero(&f[4])? as u32,
        parse_int_or_zero(&f[5])? as u32,
        parse_int_or_zero(&f[6])? as u32,
    );
    let date = NaiveDate::from_ymd_opt(y, mo.max(1), d.max(1)).ok_or(DecodeError::MalformedJson)?;
    let time = NaiveTime::from_hms_micro_opt(h, mi, s, us).ok_or(DecodeError::MalformedJson)?;
    check_timezone(&tz)?;
    Ok(Value::DateTime(NaiveDateTime::new(date, time), tz))
}

/// This crate has no timezone database linked in (see DESIGN.md's Open
/// Question on timezone support); a named zone is accepted syntactically
/// and carried through as a string rather than resolved. A caller with
/// access to tracing context may still warn on an implausible zone name;
/// this helper only validates the zone is a plausible identifier.
fn check_timezone(tz: &Option<String>) -> Result<(), DecodeError> {
    match tz {
        Some(z) if z.chars().any(|c| c.is_whitespace() && c != ' ') => {
            Err(DecodeError::UnknownTimezone(z.clone()))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn roundtrip(v: Value) {
        let encoded = encode_scalar(&v);
        let decoded = decode_scalar(&encoded).expect("decode");
        assert_eq!(decoded, v, "roundtrip mismatch for encoded={:?}", String::from_utf8_lossy(&encoded));
    }

    #[test]
    fn scalars_roundtrip() {
        roundtrip(Value::Bool(true));
        roundtrip(Value::Bool(false));
        roundtrip(Value::Int(-42));
        roundtrip(Value::Float(1.5));
        roundtrip(Value::Null);
        roundtrip(Value::Bytes(vec![0, 1, 2, 255]));
        roundtrip(Value::Unicode("hello \u{1F600}".to_string()));
    }

    #[test]
    fn date_roundtrips() {
        roundtrip(Value::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()));
    }

    #[test]
    fn datetime_without_zone_roundtrips() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_micro_opt(3, 4, 5, 6)
            .unwrap();
        roundtrip(Value::DateTime(dt, None));
    }

    #[test]
    fn datetime_with_named_zone_roundtrips_with_same_zone_name() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_micro_opt(3, 4, 5, 0)
            .unwrap();
        roundtrip(Value::DateTime(dt, Some("UTC".to_string())));
    }

    #[test]
    fn unknown_code_is_reported() {
        assert!(matches!(decode_scalar(b"z:x"), Err(DecodeError::UnknownCode(b'z'))));
    }
}
