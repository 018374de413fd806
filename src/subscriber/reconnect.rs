//! Reconnect supervisor: (re)establishes the publisher connection, runs
//! the ACK/name/ACK handshake, and spawns a reader task per live
//! connection. Grounded on `socreceiver.py`'s `connectme()`.

use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use super::{Connection, Subscriber};
use crate::wire::ACK;

pub async fn run(sub: Subscriber) {
    while sub.loop_connect.load(Ordering::Acquire) {
        if sub.connected.load(Ordering::Acquire) {
            tokio::time::sleep(sub.connect_wait).await;
            continue;
        }

        let stream = match TcpStream::connect((sub.host.as_str(), sub.port)).await {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, "subscriber connect failed, will retry");
                tokio::time::sleep(sub.connect_wait).await;
                continue;
            }
        };

        let (mut read_half, mut write_half) = stream.into_split();

        if !await_ack(&mut read_half).await {
            warn!("subscriber handshake: missing initial ACK");
            tokio::time::sleep(sub.connect_wait).await;
            continue;
        }

        if write_half.write_all(sub.name.as_bytes()).await.is_err() {
            tokio::time::sleep(sub.connect_wait).await;
            continue;
        }

        if !await_ack(&mut read_half).await {
            warn!("subscriber handshake: missing name ACK");
            tokio::time::sleep(sub.connect_wait).await;
            continue;
        }

        sub.connected.store(true, Ordering::Release);
        let reader = tokio::spawn(super::reader::run(sub.clone(), read_half, write_half));
        *sub.connection.lock().await = Some(Connection { reader });
        sub.handler.on_connect();

        tokio::time::sleep(sub.connect_wait).await;
    }
}

async fn await_ack(read_half: &mut OwnedReadHalf) -> bool {
    use tokio::io::AsyncReadExt;
    let mut byte = [0u8; 1];
    matches!(
        tokio::time::timeout(Duration::from_secs(1), read_half.read_exact(&mut byte)).await,
        Ok(Ok(_))
    ) && byte[0] == ACK
}
