//! Acceptor worker: admits candidate subscribers, running the
//! ACK/name/ACK handshake and the name-collision liveness probe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::broadcaster::{ping, PendingPings};
use super::buffer::SendBuffer;
use super::registry::{Registry, SubscriberHandle};
use crate::publisher::PublisherHandler;
use crate::wire::{ACK, NAME_LEN};

pub async fn run(
    listener: TcpListener,
    registry: Registry,
    buffer: Arc<SendBuffer>,
    pending_pings: Arc<PendingPings>,
    max_receivers: usize,
    running: Arc<AtomicBool>,
    handler: Arc<dyn PublisherHandler>,
) {
    while running.load(Ordering::Acquire) {
        let accepted = tokio::time::timeout(Duration::from_secs(1), listener.accept()).await;
        let (stream, addr) = match accepted {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                warn!(error = %e, "accept error");
                continue;
            }
            Err(_) => continue, // 1s timeout elapsed, loop to re-check `running`
        };
        if !running.load(Ordering::Acquire) {
            break;
        }
        debug!(%addr, "candidate subscriber connected");

        let (mut read_half, mut write_half) = stream.into_split();
        if write_half.write_all(&[ACK]).await.is_err() {
            continue;
        }

        let mut name_buf = [0u8; NAME_LEN];
        let name = match tokio::time::timeout(Duration::from_secs(5), read_half.read(&mut name_buf)).await {
            Ok(Ok(n)) if n > 0 => String::from_utf8_lossy(&name_buf[..n]).into_owned(),
            _ => {
                debug!(%addr, "handshake name read failed or timed out");
                continue;
            }
        };

        if registry.contains(&name).await {
            let still_alive = ping(&buffer, &pending_pings, "")
                .await
                .get(&name)
                .copied()
                .flatten()
                .unwrap_or(false);
            if still_alive {
                info!(name, "refusing duplicate-name connection, incumbent still alive");
                continue; // candidate's streams drop here
            }
            registry.remove(&name).await;
        } else if registry.len().await >= max_receivers {
            debug!(name, "refusing connection, registry at capacity");
            continue;
        }

        if write_half.write_all(&[ACK]).await.is_err() {
            continue;
        }
        registry.insert(name.clone(), SubscriberHandle::spawn(read_half, write_half)).await;
        handler.on_connect(&name);
    }
}
