//! Bounded-in-practice send buffer: producers append, the broadcaster
//! drains from the head. Under overload the broadcaster coalesces
//! adjacent non-ping frames before sending.

use std::collections::VecDeque;

use tokio::sync::Mutex;

use crate::wire::{OVERLOAD_FRACTION, SEND_FREQ_HZ};

/// One item pending broadcast: the already-framed bytes, and whether
/// it's a ping (pings never coalesce and never merge across).
pub type Entry = (Vec<u8>, bool);

/// A coalesced unit ready to send, tagged with how many original buffer
/// entries it consumed so the caller can drain the right count.
pub struct CoalescedEntry {
    pub bytes: Vec<u8>,
    pub is_ping: bool,
    pub consumed: usize,
}

#[derive(Default)]
pub struct SendBuffer {
    queue: Mutex<VecDeque<Entry>>,
}

impl SendBuffer {
    pub async fn push(&self, bytes: Vec<u8>, is_ping: bool) {
        self.queue.lock().await.push_back((bytes, is_ping));
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn clear(&self) {
        self.queue.lock().await.clear();
    }

    /// Snapshots the queue, applies the coalescing policy if overloaded,
    /// and returns the entries to send this tick. Does not mutate the
    /// queue — call [`SendBuffer::drain`] afterward with the total
    /// `consumed` count once the entries have actually been sent.
    pub async fn plan_tick(&self) -> Vec<CoalescedEntry> {
        let snapshot: Vec<Entry> = self.queue.lock().await.iter().cloned().collect();
        if snapshot.is_empty() {
            return Vec::new();
        }
        let threshold = OVERLOAD_FRACTION * SEND_FREQ_HZ;
        if (snapshot.len() as f64) < threshold {
            return snapshot
                .into_iter()
                .map(|(bytes, is_ping)| CoalescedEntry {
                    bytes,
                    is_ping,
                    consumed: 1,
                })
                .collect();
        }
        coalesce(snapshot, threshold)
    }

    /// Removes `count` entries from the head of the queue.
    pub async fn drain(&self, count: usize) {
        let mut q = self.queue.lock().await;
        for _ in 0..count {
            if q.pop_front().is_none() {
                break;
            }
        }
    }
}

/// Merges adjacent non-ping entries, bounded by `avg = floor(len /
/// threshold)` merges per group. Ping entries never coalesce and never
/// have other entries merged across them.
fn coalesce(snapshot: Vec<Entry>, threshold: f64) -> Vec<CoalescedEntry> {
    let avg_join = (snapshot.len() as f64 / threshold).floor().max(1.0) as usize;
    let mut out: Vec<CoalescedEntry> = Vec::new();
    for (bytes, is_ping) in snapshot {
        let can_merge = !is_ping
            && out
                .last()
                .is_some_and(|last| !last.is_ping && last.consumed < avg_join);
        if can_merge {
            let last = out.last_mut().unwrap();
            last.bytes.extend_from_slice(&bytes);
            last.consumed += 1;
        } else {
            out.push(CoalescedEntry {
                bytes,
                is_ping,
                consumed: 1,
            });
        }
    }
    out
}
