//! Extended JSON: every scalar is stringified as `"code:value"`, so types
//! absent from plain JSON (typed bytes, tz-aware datetimes) survive a
//! round trip. Built on top of `serde_json` as the external JSON
//! collaborator — only the type-prefix extension belongs to this crate.
//!
//! The original represents a scalar's encoded body as a `Byt`, a latin-1
//! byte string rather than a UTF-8 `str` — every byte value is a valid
//! latin-1 code point, so nothing about the scheme depends on the body
//! happening to be valid UTF-8. `body_to_string`/`string_to_body` carry
//! that same byte<->codepoint bijection over JSON's UTF-8 string type.

use super::value::{decode_scalar, encode_scalar, Value};
use crate::error::DecodeError;

/// Serializes `v` to an extended-JSON string.
pub fn json_dumps(v: &Value) -> String {
    match v {
        Value::List(items) => {
            let parts: Vec<String> = items.iter().map(json_dumps).collect();
            format!("[{}]", parts.join(","))
        }
        Value::Map(entries) => {
            let parts: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}:{}", serde_json::to_string(k).unwrap(), json_dumps(v)))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        scalar => {
            let bytes = encode_scalar(scalar);
            serde_json::to_string(&body_to_string(&bytes)).unwrap_or_else(|_| "\"n:\"".to_string())
        }
    }
}

/// Maps a scalar-encoded byte body 1:1 onto Unicode code points `U+0000`
/// through `U+00FF`, so every possible byte value, valid UTF-8 or not,
/// round-trips through a JSON string unchanged.
fn body_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Reverses [`body_to_string`]. Any character outside `U+0000..=U+00FF`
/// did not come from this encoding.
fn string_to_body(s: &str) -> Result<Vec<u8>, DecodeError> {
    s.chars()
        .map(|c| u8::try_from(c as u32).map_err(|_| DecodeError::MalformedJson))
        .collect()
}

/// Parses an extended-JSON string back into a [`Value`] tree.
pub fn json_loads(s: &str) -> Result<Value, DecodeError> {
    let raw: serde_json::Value = serde_json::from_str(s).map_err(|_| DecodeError::MalformedJson)?;
    unpack(raw)
}

fn unpack(raw: serde_json::Value) -> Result<Value, DecodeError> {
    match raw {
        serde_json::Value::Array(items) => {
            let values = items.into_iter().map(unpack).collect::<Result<_, _>>()?;
            Ok(Value::List(values))
        }
        serde_json::Value::Object(map) => {
            let mut entries = Vec::with_capacity(map.len());
            for (k, v) in map {
                entries.push((k, unpack(v)?));
            }
            Ok(Value::Map(entries))
        }
        serde_json::Value::String(s) => decode_scalar(&string_to_body(&s)?),
        // Plain JSON scalars with no type prefix (e.g. hand-written test
        // fixtures) are treated as malformed rather than guessed at — the
        // extension's whole point is that every scalar carries its code.
        _ => Err(DecodeError::MalformedJson),
    }
}
