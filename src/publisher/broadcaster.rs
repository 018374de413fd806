//! Broadcaster worker: paces the send buffer at `SEND_FREQ_HZ`, coalesces
//! under overload, fans each entry out to every registered subscriber,
//! and resolves the ping rendezvous.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{oneshot, Mutex};
use tracing::warn;

use super::buffer::SendBuffer;
use super::registry::Registry;
use crate::wire::codec::build_frame;
use crate::wire::{PING_KEY, SEND_FREQ_HZ};

/// Per-subscriber ping outcome: `Some(true)` acked, `Some(false)` timed
/// out / dropped, `None` when no-ACK mode makes the answer meaningless.
pub type PingResult = HashMap<String, Option<bool>>;

pub type PendingPings = Mutex<VecDeque<oneshot::Sender<PingResult>>>;

pub async fn run(
    registry: Registry,
    buffer: Arc<SendBuffer>,
    pending_pings: Arc<PendingPings>,
    timeout_ack: Option<Duration>,
    running: Arc<AtomicBool>,
) {
    let tick = Duration::from_secs_f64(0.99 / SEND_FREQ_HZ);
    while running.load(Ordering::Acquire) {
        let plan = buffer.plan_tick().await;
        if plan.is_empty() {
            tokio::time::sleep(Duration::from_micros(100)).await;
            continue;
        }
        for entry in plan {
            let start = Instant::now();
            let mut ping_res = PingResult::new();
            for (name, handle) in registry.snapshot().await {
                let ok = tell_receiver(&registry, &name, &handle, &entry.bytes, entry.is_ping, timeout_ack).await;
                ping_res.insert(name, ok);
            }
            if entry.is_ping {
                if let Some(tx) = pending_pings.lock().await.pop_front() {
                    let _ = tx.send(ping_res);
                }
            }
            buffer.drain(entry.consumed).await;
            let elapsed = start.elapsed();
            if elapsed < tick {
                tokio::time::sleep(tick - elapsed).await;
            }
        }
    }
}

/// `_tell_receiver`: sends, then awaits ACK per `timeout_ack`'s policy.
async fn tell_receiver(
    registry: &Registry,
    name: &str,
    handle: &super::registry::SubscriberHandle,
    bytes: &[u8],
    is_ping: bool,
    timeout_ack: Option<Duration>,
) -> Option<bool> {
    if handle.send(bytes).await.is_err() {
        registry.remove(name).await;
        return Some(false);
    }
    match timeout_ack {
        None => {
            if is_ping {
                Some(handle.wait_ack(Duration::from_secs(1)).await.is_some())
            } else {
                None
            }
        }
        Some(timeout) => {
            if handle.wait_ack(timeout).await.is_some() {
                Some(true)
            } else {
                warn!(subscriber = name, "ack timeout, dropping subscriber");
                registry.remove(name).await;
                Some(false)
            }
        }
    }
}

/// Enqueues a `__png__` frame and awaits the broadcaster's next ping
/// result — the public `ping()` entry point's implementation. Framed
/// exactly like `_tell`'s frames, so the subscriber's reassembly loop
/// recognizes and ACKs it like any other frame.
pub async fn ping(buffer: &SendBuffer, pending_pings: &PendingPings, tag: &str) -> PingResult {
    let (tx, rx) = oneshot::channel();
    pending_pings.lock().await.push_back(tx);
    let frame = build_frame(PING_KEY, tag, true, b"");
    buffer.push(frame, true).await;
    rx.await.unwrap_or_default()
}
