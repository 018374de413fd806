//! Lazy decode wrapper: the `Message` type from `core.py`, re-expressed as
//! a one-shot memoizing container instead of a property that decodes on
//! first access.

use std::sync::OnceLock;

use super::json::json_loads;
use super::value::Value;
use crate::error::DecodeError;

/// A payload that decodes on first access to [`Message::value`] and
/// caches the result. Used when a frame arrives with `UNPACK = '0'`: the
/// receiver gets the raw bytes up front and only pays the extended-JSON
/// decode cost if it actually reads `value()`.
pub struct Message {
    raw: Vec<u8>,
    decoded: OnceLock<Result<Value, DecodeError>>,
}

impl Message {
    pub fn new(raw: Vec<u8>) -> Self {
        Message {
            raw,
            decoded: OnceLock::new(),
        }
    }

    /// The untouched raw payload bytes.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Decodes (once) and returns the value, or the decode error.
    pub fn value(&self) -> Result<&Value, &DecodeError> {
        self.decoded
            .get_or_init(|| {
                std::str::from_utf8(&self.raw)
                    .map_err(|_| DecodeError::MalformedJson)
                    .and_then(|s| json_loads(s))
            })
            .as_ref()
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message").field("raw_len", &self.raw.len()).finish()
    }
}

/// What a subscriber's reader dispatches to `process()` for a single
/// decoded frame.
#[derive(Debug)]
pub enum Payload {
    /// `__raw__` frame — opaque bytes, never decoded.
    Raw(Vec<u8>),
    /// `__jsn__` frame with `UNPACK = '1'` — already decoded.
    Decoded(Value),
    /// `__jsn__` frame with `UNPACK = '0'` — decode on first access.
    Lazy(Message),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::value::Value;

    #[test]
    fn message_decodes_once_and_caches() {
        let raw = crate::wire::json::json_dumps(&Value::Int(5)).into_bytes();
        let msg = Message::new(raw);
        assert_eq!(msg.value().unwrap(), &Value::Int(5));
        // second access hits the cache, same result
        assert_eq!(msg.value().unwrap(), &Value::Int(5));
    }

    #[test]
    fn message_surfaces_decode_error_without_panicking() {
        let msg = Message::new(b"not extended json".to_vec());
        assert!(msg.value().is_err());
    }
}
