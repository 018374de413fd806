//! Reader worker: drains the inbound byte stream, reassembles frames via
//! `split_stream`, batch-ACKs, and dispatches by control key. Grounded
//! on `socreceiver.py`'s `tellme()`.

use std::sync::atomic::Ordering;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, warn};

use super::Subscriber;
use crate::wire::codec::{parse_frame, split_stream};
use crate::wire::message::{Message, Payload};
use crate::wire::{ACK, DIE_KEY, JSON_KEY, PING_KEY, RAW_KEY};

pub async fn run(sub: Subscriber, mut read_half: OwnedReadHalf, mut write_half: OwnedWriteHalf) {
    let mut reassembly = BytesMut::new();
    let mut chunk = vec![0u8; sub.buffer_size];

    loop {
        let read = match tokio::time::timeout(Duration::from_secs(1), read_half.read(&mut chunk)).await {
            Ok(Ok(0)) => {
                debug!("subscriber stream closed by peer");
                break;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                debug!(error = %e, "subscriber read error");
                break;
            }
            Err(_) => continue, // 1s timeout elapsed, loop to re-check liveness below
        };
        if !sub.connected.load(Ordering::Acquire) {
            break;
        }
        reassembly.extend_from_slice(&chunk[..read]);

        let (frames, tail) = split_stream(&reassembly);
        if frames.is_empty() {
            continue;
        }
        reassembly = BytesMut::from(&tail[..]);

        if write_half.write_all(&[ACK]).await.is_err() {
            break;
        }

        let mut die_received = false;
        for frame in &frames {
            if dispatch(&sub, frame) {
                die_received = true;
                break;
            }
        }
        if die_received {
            break;
        }
    }

    sub.connected.store(false, Ordering::Release);
}

/// Dispatches one reassembled frame to the handler. Returns `true` if
/// this was a die signal and the reader should stop.
fn dispatch(sub: &Subscriber, frame: &[u8]) -> bool {
    let Some(parsed) = parse_frame(frame) else {
        warn!("subscriber: malformed frame header, dropped");
        return false;
    };
    match parsed.key {
        DIE_KEY => true,
        PING_KEY => false,
        RAW_KEY => {
            sub.handler.process(Payload::Raw(parsed.payload.to_vec()), parsed.tag);
            false
        }
        JSON_KEY if parsed.unpack => {
            match crate::wire::json::json_loads(&String::from_utf8_lossy(parsed.payload)) {
                Ok(value) => sub.handler.process(Payload::Decoded(value), parsed.tag),
                Err(e) => {
                    warn!(error = %e, "subscriber: decode failure, delivering raw payload");
                    sub.handler.process(Payload::Raw(parsed.payload.to_vec()), parsed.tag);
                }
            }
            false
        }
        JSON_KEY => {
            sub.handler
                .process(Payload::Lazy(Message::new(parsed.payload.to_vec())), parsed.tag);
            false
        }
        other => {
            warn!(key = ?other, "subscriber: unknown control key, treated as protocol error");
            false
        }
    }
}
