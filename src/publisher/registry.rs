//! Subscriber registry: name -> connection handle, with snapshot-iteration
//! so the acceptor, broadcaster, and drop path never hold the lock across
//! an `.await` on socket I/O.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::wire::ACK;

/// Live connection to one admitted subscriber.
pub struct SubscriberHandle {
    write_half: Mutex<OwnedWriteHalf>,
    ack_rx: Mutex<mpsc::Receiver<()>>,
    ack_reader: JoinHandle<()>,
}

impl SubscriberHandle {
    pub fn spawn(read_half: OwnedReadHalf, write_half: OwnedWriteHalf) -> Self {
        let (tx, rx) = mpsc::channel(8);
        let ack_reader = tokio::spawn(ack_reader_loop(read_half, tx));
        SubscriberHandle {
            write_half: Mutex::new(write_half),
            ack_rx: Mutex::new(rx),
            ack_reader,
        }
    }

    pub async fn send(&self, bytes: &[u8]) -> std::io::Result<()> {
        self.write_half.lock().await.write_all(bytes).await
    }

    /// Waits for the next ACK, or `None` if the timeout elapses or the
    /// connection has closed.
    pub async fn wait_ack(&self, timeout: Duration) -> Option<()> {
        tokio::time::timeout(timeout, self.ack_rx.lock().await.recv())
            .await
            .ok()
            .flatten()
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        self.ack_reader.abort();
    }
}

async fn ack_reader_loop(mut read_half: OwnedReadHalf, tx: mpsc::Sender<()>) {
    let mut byte = [0u8; 1];
    loop {
        match read_half.read_exact(&mut byte).await {
            Ok(_) if byte[0] == ACK => {
                if tx.send(()).await.is_err() {
                    return;
                }
            }
            Ok(_) => continue,
            Err(_) => {
                debug!("subscriber ack stream closed");
                return;
            }
        }
    }
}

/// The publisher-side map of subscriber name -> handle.
#[derive(Default, Clone)]
pub struct Registry {
    inner: Arc<Mutex<HashMap<String, Arc<SubscriberHandle>>>>,
}

impl Registry {
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.inner.lock().await.contains_key(name)
    }

    pub async fn insert(&self, name: String, handle: SubscriberHandle) {
        self.inner.lock().await.insert(name, Arc::new(handle));
    }

    /// Removes and returns the named entry, if present.
    pub async fn remove(&self, name: &str) -> Option<Arc<SubscriberHandle>> {
        self.inner.lock().await.remove(name)
    }

    /// Copies out `(name, handle)` pairs under the lock, then releases it
    /// — callers iterate and `.await` on I/O outside the lock.
    pub async fn snapshot(&self) -> Vec<(String, Arc<SubscriberHandle>)> {
        self.inner
            .lock()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub async fn clear(&self) {
        self.inner.lock().await.clear();
    }
}
