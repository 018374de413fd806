//! Subscriber: connects to a publisher, reconnects on loss, and dispatches
//! reassembled frames to a user handler.

mod reader;
mod reconnect;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::SubscriberError;
use crate::wire::message::Payload;
use crate::wire;

/// Overridable callbacks a subscriber embedder can hook. Mirrors
/// `process`/`_newconnection` on the original `SocReceiver`.
pub trait SubscriberHandler: Send + Sync {
    /// Invoked for every decoded frame. Default body discards it — an
    /// embedder almost always wants to override this one.
    fn process(&self, payload: Payload, tag: String) {
        let _ = (payload, tag);
    }
    fn on_connect(&self) {
        debug!("subscriber: connected");
    }
}

/// Default handler: logs only, drops every payload.
#[derive(Default)]
pub struct NoopSubscriberHandler;
impl SubscriberHandler for NoopSubscriberHandler {}

#[derive(Clone)]
pub struct SubscriberOptions {
    pub buffer_size: usize,
    pub connect_wait: Duration,
    pub hostname: String,
    pub portname: String,
    pub handler: Arc<dyn SubscriberHandler>,
}

impl Default for SubscriberOptions {
    fn default() -> Self {
        SubscriberOptions {
            buffer_size: 1024,
            connect_wait: Duration::from_secs_f64(0.5),
            hostname: "127.0.0.1".to_string(),
            portname: String::new(),
            handler: Arc::new(NoopSubscriberHandler),
        }
    }
}

struct Connection {
    reader: JoinHandle<()>,
}

/// A subscriber client. Cheaply cloneable; clones share the same
/// connection state and handler.
#[derive(Clone)]
pub struct Subscriber {
    host: String,
    port: u16,
    name: String,
    portname: String,
    buffer_size: usize,
    connect_wait: Duration,
    handler: Arc<dyn SubscriberHandler>,
    loop_connect: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    supervisor: Arc<Mutex<Option<JoinHandle<()>>>>,
    connection: Arc<Mutex<Option<Connection>>>,
}

impl Subscriber {
    /// Creates a subscriber. `name` is truncated to [`wire::NAME_LEN`] bytes;
    /// an empty name (after truncation) is rejected, unlike the original
    /// which only truncates.
    pub fn new(port: u16, name: &str, options: SubscriberOptions) -> Result<Self, SubscriberError> {
        let cleaned = wire::clean_name(name);
        if cleaned.is_empty() {
            return Err(SubscriberError::InvalidName);
        }
        Ok(Subscriber {
            host: options.hostname,
            port,
            name: cleaned,
            portname: wire::clean_tag(&options.portname),
            buffer_size: options.buffer_size.max(1),
            connect_wait: options.connect_wait,
            handler: options.handler,
            loop_connect: Arc::new(AtomicBool::new(false)),
            connected: Arc::new(AtomicBool::new(false)),
            supervisor: Arc::new(Mutex::new(None)),
            connection: Arc::new(Mutex::new(None)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn portname(&self) -> &str {
        &self.portname
    }

    /// Whether the reconnect loop is active (not whether a connection is
    /// currently live — see [`Subscriber::connected`]).
    pub fn running(&self) -> bool {
        self.loop_connect.load(Ordering::Acquire)
    }

    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Starts the reconnect supervisor. Idempotent.
    pub async fn connect(&self) {
        if self.loop_connect.swap(true, Ordering::AcqRel) {
            return;
        }
        let handle = tokio::spawn(reconnect::run(self.clone()));
        *self.supervisor.lock().await = Some(handle);
    }

    /// Stops the reconnect loop from starting a new attempt. Does not
    /// close an already-live connection.
    pub fn stop_connect_loop(&self) {
        self.loop_connect.store(false, Ordering::Release);
    }

    /// Tears down the active connection (if any) and stops the reconnect
    /// loop. Can be restarted with [`Subscriber::connect`].
    pub async fn close(&self) {
        self.loop_connect.store(false, Ordering::Release);
        self.connected.store(false, Ordering::Release);
        if let Some(supervisor) = self.supervisor.lock().await.take() {
            supervisor.abort();
        }
        if let Some(connection) = self.connection.lock().await.take() {
            connection.reader.abort();
        }
    }
}
