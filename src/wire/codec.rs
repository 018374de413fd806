//! Byte-escape framing: `frame()` packages a payload for the wire,
//! `split_stream()` recovers payloads (plus an incomplete tail) from an
//! inbound byte stream.

use super::{KEY_LEN, MAP, END};

/// Escapes every occurrence of `END` in `payload` and appends the
/// doubled end marker.
///
/// `payload.replace(END, END+ESC) + END + END`, per the wire spec.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = escape(payload);
    out.extend_from_slice(&END);
    out.extend_from_slice(&END);
    out
}

fn escape(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len());
    let mut i = 0;
    while i < payload.len() {
        if payload[i..].starts_with(&END) {
            out.extend_from_slice(&END);
            out.push(super::ESC);
            i += END.len();
        } else {
            out.push(payload[i]);
            i += 1;
        }
    }
    out
}

fn unescape(piece: &[u8]) -> Vec<u8> {
    let escaped = [END[0], END[1], super::ESC];
    let mut out = Vec::with_capacity(piece.len());
    let mut i = 0;
    while i < piece.len() {
        if piece[i..].starts_with(&escaped) {
            out.extend_from_slice(&END);
            i += escaped.len();
        } else {
            out.push(piece[i]);
            i += 1;
        }
    }
    out
}

/// Splits `buf` on the doubled end marker `END END`, unescaping every
/// piece except the last (which is the tail of an incomplete frame, or
/// the whole buffer if no double-marker was found).
///
/// Property: for any payloads `p1..pk`, `split_stream(frame(p1) + .. +
/// frame(pk) + tail)` returns `([p1, .., pk], tail)`, provided `tail`
/// contains no embedded `END END`.
pub fn split_stream(buf: &[u8]) -> (Vec<Vec<u8>>, Vec<u8>) {
    let dmark = [END[0], END[1], END[0], END[1]];
    let mut frames = Vec::new();
    let mut rest = buf;
    loop {
        match find(rest, &dmark) {
            Some(idx) => {
                frames.push(unescape(&rest[..idx]));
                rest = &rest[idx + dmark.len()..];
            }
            None => break,
        }
    }
    (frames, rest.to_vec())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Builds a complete on-wire frame: `KEY + TAG + ':' + UNPACK + ':' +
/// frame(payload)`.
pub fn build_frame(key: [u8; KEY_LEN], tag: &str, unpack: bool, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(KEY_LEN + tag.len() + 2 + payload.len());
    out.extend_from_slice(&key);
    out.extend_from_slice(tag.as_bytes());
    out.push(MAP);
    out.push(if unpack { b'1' } else { b'0' });
    out.push(MAP);
    out.extend_from_slice(&frame(payload));
    out
}

/// A decoded frame header, borrowed from the buffer it was parsed out of.
pub struct ParsedFrame<'a> {
    pub key: [u8; KEY_LEN],
    pub tag: String,
    pub unpack: bool,
    pub payload: &'a [u8],
}

/// Parses one already-unescaped frame (as returned by [`split_stream`])
/// back into key/tag/unpack/payload. Returns `None` on a malformed
/// header rather than erroring, matching the original's tolerant
/// handling of a misbehaving peer.
pub fn parse_frame(raw: &[u8]) -> Option<ParsedFrame<'_>> {
    if raw.len() < KEY_LEN {
        return None;
    }
    let key: [u8; KEY_LEN] = raw[..KEY_LEN].try_into().ok()?;
    let rest = &raw[KEY_LEN..];
    let sep = rest.iter().position(|&b| b == MAP)?;
    let tag = String::from_utf8_lossy(&rest[..sep]).into_owned();
    let after_tag = &rest[sep + 1..];
    if after_tag.len() < 2 || after_tag[1] != MAP {
        return None;
    }
    let unpack = after_tag[0] == b'1';
    Some(ParsedFrame {
        key,
        tag,
        unpack,
        payload: &after_tag[2..],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_then_split_roundtrips_plain_payload() {
        let f = frame(b"hello");
        let (frames, tail) = split_stream(&f);
        assert_eq!(frames, vec![b"hello".to_vec()]);
        assert!(tail.is_empty());
    }

    #[test]
    fn frame_then_split_roundtrips_embedded_end_marker() {
        for payload in [&b"\xac\x96"[..], &b"\xac\x96\xac\x96"[..], &b"\xee\xac\x96"[..]] {
            let f = frame(payload);
            let (frames, tail) = split_stream(&f);
            assert_eq!(frames, vec![payload.to_vec()]);
            assert!(tail.is_empty());
        }
    }

    #[test]
    fn split_stream_handles_multiple_concatenated_frames_plus_tail() {
        let mut buf = frame(b"one");
        buf.extend(frame(b"two"));
        buf.extend(frame(b"\xac\x96three"));
        buf.extend_from_slice(b"partial-tail");
        let (frames, tail) = split_stream(&buf);
        assert_eq!(
            frames,
            vec![b"one".to_vec(), b"two".to_vec(), b"\xac\x96three".to_vec()]
        );
        assert_eq!(tail, b"partial-tail".to_vec());
    }

    #[test]
    fn split_stream_with_no_marker_returns_whole_buffer_as_tail() {
        let (frames, tail) = split_stream(b"no markers here");
        assert!(frames.is_empty());
        assert_eq!(tail, b"no markers here".to_vec());
    }

    #[test]
    fn build_frame_then_parse_frame_roundtrips() {
        let raw = build_frame(*b"__raw__", "mytag", true, b"payload\xac\x96end");
        let (frames, tail) = split_stream(&raw);
        assert!(tail.is_empty());
        assert_eq!(frames.len(), 1);
        let parsed = parse_frame(&frames[0]).expect("well-formed frame");
        assert_eq!(&parsed.key, b"__raw__");
        assert_eq!(parsed.tag, "mytag");
        assert!(parsed.unpack);
        assert_eq!(parsed.payload, b"payload\xac\x96end");
    }

    #[test]
    fn split_stream_reassembles_across_simulated_tcp_chunk_boundary() {
        let full = frame(b"chunked-payload");
        let (first, second) = full.split_at(full.len() - 3);

        let (frames, tail) = split_stream(first);
        assert!(frames.is_empty());

        let mut rebuilt = tail;
        rebuilt.extend_from_slice(second);
        let (frames, tail) = split_stream(&rebuilt);
        assert_eq!(frames, vec![b"chunked-payload".to_vec()]);
        assert!(tail.is_empty());
    }
}
