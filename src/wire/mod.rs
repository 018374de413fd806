//! Shared wire constants: delimiters, control keys, and tag limits.
//!
//! Every constant here must agree byte-for-byte between the publisher and
//! the subscriber; this module exists so both sides import the same
//! definitions instead of each re-deriving them.

pub mod codec;
pub mod json;
pub mod message;
pub mod value;

/// Two-byte end-of-frame marker. Doubled (`END END`) terminates a frame;
/// a lone occurrence inside a payload is escaped to `END ESC`.
pub const END: [u8; 2] = [0xAC, 0x96];

/// Escape byte appended after an `END` sequence found inside a payload.
pub const ESC: u8 = 0xEE;

/// Dictionary/list item delimiter (doubled), used inside extended-JSON
/// container encodings that need to escape their own item separator.
pub const DSEP: [u8; 2] = [0xAC, 0xBD];

/// Key/tag/unpack-flag separator.
pub const MAP: u8 = b':';

/// Maximum tag length in bytes.
pub const TAG_LEN: usize = 15;

/// Maximum subscriber name length in bytes.
pub const NAME_LEN: usize = 15;

/// Length in bytes of every control key (`__xxx__`).
pub const KEY_LEN: usize = 7;

/// Instruct subscriber(s) to terminate their reader.
pub const DIE_KEY: [u8; KEY_LEN] = *b"__die__";
/// Liveness probe; the subscriber's normal ACK serves as the reply.
pub const PING_KEY: [u8; KEY_LEN] = *b"__png__";
/// Raw, undecoded user payload.
pub const RAW_KEY: [u8; KEY_LEN] = *b"__raw__";
/// Extended-JSON encoded payload.
pub const JSON_KEY: [u8; KEY_LEN] = *b"__jsn__";

/// The single-byte acknowledgement the protocol exchanges at handshake
/// time and after every reassembled batch.
pub const ACK: u8 = 0x06;

/// Target broadcast pacing rate, in Hz.
pub const SEND_FREQ_HZ: f64 = 100.0;

/// Fraction of `SEND_FREQ_HZ` at which the broadcaster starts coalescing
/// adjacent frames in its send buffer.
pub const OVERLOAD_FRACTION: f64 = 0.85;

/// Characters allowed in a sanitized tag: `[A-Za-z0-9 ._-]`.
fn tag_char_allowed(c: u8) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, b' ' | b'.' | b'_' | b'-')
}

/// `clean_tag(s) = s[:15]` after stripping any character not in the
/// allowed class.
pub fn clean_tag(s: &str) -> String {
    let cleaned: String = s.chars().filter(|c| c.is_ascii() && tag_char_allowed(*c as u8)).collect();
    cleaned.chars().take(TAG_LEN).collect()
}

/// Truncates (never pads) a subscriber name to [`NAME_LEN`] bytes.
pub fn clean_name(s: &str) -> String {
    s.chars().take(NAME_LEN).collect()
}
