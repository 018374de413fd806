//! Publisher: binds a port, admits up to a fixed number of named
//! subscribers, and fan-out broadcasts framed messages with per-subscriber
//! ACK.

mod acceptor;
mod broadcaster;
mod buffer;
mod registry;

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::debug;

use self::broadcaster::{PendingPings, PingResult};
use self::buffer::SendBuffer;
use self::registry::Registry;
use crate::error::PublisherError;
use crate::wire::{self, DIE_KEY, JSON_KEY, RAW_KEY};

/// Overridable callbacks a publisher embedder can hook. Mirrors
/// `_newconnection`/`_dropped` on the original `SocTransmitter`; default
/// bodies just log, matching the original's `print`-based defaults.
pub trait PublisherHandler: Send + Sync {
    fn on_connect(&self, name: &str) {
        debug!(name, "publisher: new subscriber connected");
    }
    fn on_dropped(&self, name: &str) {
        debug!(name, "publisher: subscriber dropped");
    }
}

/// Default handler: logs only.
#[derive(Default)]
pub struct NoopPublisherHandler;
impl PublisherHandler for NoopPublisherHandler {}

/// Constructor options beyond `port`/`nreceivermax`, all optional in the
/// original Python signature.
#[derive(Clone)]
pub struct PublisherOptions {
    pub portname: String,
    /// `None` disables ACK waiting entirely (fire-and-forget mode).
    pub timeout_ack: Option<Duration>,
    pub handler: Arc<dyn PublisherHandler>,
}

impl Default for PublisherOptions {
    fn default() -> Self {
        PublisherOptions {
            portname: String::new(),
            timeout_ack: Some(Duration::from_secs_f64(1.0)),
            handler: Arc::new(NoopPublisherHandler),
        }
    }
}

struct Tasks {
    acceptor: JoinHandle<()>,
    broadcaster: JoinHandle<()>,
}

/// A publisher socket. Cheaply cloneable; clones share the same running
/// state, registry, and send buffer.
#[derive(Clone)]
pub struct Publisher {
    port: u16,
    bound_port: Arc<AtomicU16>,
    portname: String,
    nreceivermax: usize,
    timeout_ack: Option<Duration>,
    handler: Arc<dyn PublisherHandler>,
    running: Arc<AtomicBool>,
    registry: Registry,
    buffer: Arc<SendBuffer>,
    pending_pings: Arc<PendingPings>,
    tasks: Arc<tokio::sync::Mutex<Option<Tasks>>>,
}

impl Publisher {
    /// Creates a publisher. `nreceivermax` is clamped to `1..=5`, matching
    /// the original's `max(1, min(5, nreceivermax))`.
    pub fn new(port: u16, nreceivermax: usize, options: PublisherOptions) -> Self {
        Publisher {
            port,
            bound_port: Arc::new(AtomicU16::new(0)),
            portname: wire::clean_tag(&options.portname),
            nreceivermax: nreceivermax.clamp(1, 5),
            timeout_ack: options.timeout_ack,
            handler: options.handler,
            running: Arc::new(AtomicBool::new(false)),
            registry: Registry::default(),
            buffer: Arc::new(SendBuffer::default()),
            pending_pings: Arc::new(PendingPings::default()),
            tasks: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    pub fn portname(&self) -> &str {
        &self.portname
    }

    /// The port actually bound once [`Publisher::start`] has run; useful
    /// when constructed with port `0` for an OS-assigned ephemeral port.
    /// Before `start`, returns the port passed to [`Publisher::new`].
    pub fn port(&self) -> u16 {
        match self.bound_port.load(Ordering::Acquire) {
            0 => self.port,
            bound => bound,
        }
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// The number of subscribers currently in the registry. Observational
    /// only — an entry may have just been dropped elsewhere.
    pub async fn nreceivers(&self) -> usize {
        self.registry.len().await
    }

    /// Names of subscribers currently in the registry. Observational only
    /// — the registry is a snapshot under lock, released before this
    /// returns, so an entry may already be gone by the time a caller acts
    /// on it. Mirrors the original's `receivers` property; the raw
    /// per-connection handle stays private, so only the name side of the
    /// name→handle view is exposed.
    pub async fn receivers(&self) -> Vec<String> {
        self.registry.snapshot().await.into_iter().map(|(name, _)| name).collect()
    }

    /// Binds and starts the acceptor/broadcaster workers. Idempotent.
    pub async fn start(&self) -> Result<(), PublisherError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let listener = match TcpListener::bind(("0.0.0.0", self.port)).await {
            Ok(l) => l,
            Err(e) => {
                self.running.store(false, Ordering::Release);
                return Err(PublisherError::Bind(e));
            }
        };
        self.bound_port
            .store(listener.local_addr().map(|a| a.port()).unwrap_or(self.port), Ordering::Release);

        let acceptor = tokio::spawn(acceptor::run(
            listener,
            self.registry.clone(),
            self.buffer.clone(),
            self.pending_pings.clone(),
            self.nreceivermax,
            self.running.clone(),
            self.handler.clone(),
        ));
        let broadcaster = tokio::spawn(broadcaster::run(
            self.registry.clone(),
            self.buffer.clone(),
            self.pending_pings.clone(),
            self.timeout_ack,
            self.running.clone(),
        ));
        *self.tasks.lock().await = Some(Tasks { acceptor, broadcaster });
        Ok(())
    }

    /// Encodes `v` as extended-JSON and enqueues a `__jsn__` frame.
    /// Returns `false` if the publisher is not running.
    pub async fn tell(&self, v: &crate::wire::value::Value, tag: Option<&str>, unpack: bool) -> bool {
        let payload = crate::wire::json::json_dumps(v).into_bytes();
        self.enqueue(&JSON_KEY, &payload, tag, unpack).await
    }

    /// Enqueues a `__raw__` frame with `bytes` verbatim.
    pub async fn tell_raw(&self, bytes: &[u8], tag: Option<&str>) -> bool {
        if bytes.is_empty() {
            return false;
        }
        self.enqueue(&RAW_KEY, bytes, tag, false).await
    }

    async fn enqueue(&self, key: &[u8; 7], payload: &[u8], tag: Option<&str>, unpack: bool) -> bool {
        if !self.running() {
            return false;
        }
        let tag = wire::clean_tag(tag.unwrap_or(""));
        let framed = crate::wire::codec::build_frame(*key, &tag, unpack, payload);
        self.buffer.push(framed, key == &crate::wire::PING_KEY).await;
        true
    }

    /// Pings every live subscriber and returns their liveness, blocking
    /// until the broadcaster has asked each one.
    pub async fn ping(&self) -> PingResult {
        if !self.running() {
            return PingResult::default();
        }
        broadcaster::ping(&self.buffer, &self.pending_pings, "").await
    }

    /// Enqueues a die frame, waits for it to drain, then forcibly drops
    /// every subscriber.
    pub async fn close_receivers(&self) -> Result<(), PublisherError> {
        if !self.running() {
            return Err(PublisherError::NotRunning);
        }
        self.enqueue(&DIE_KEY, b"", None, false).await;
        while self.buffer.len().await > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        for (name, _) in self.registry.snapshot().await {
            self.registry.remove(&name).await;
            self.handler.on_dropped(&name);
        }
        Ok(())
    }

    /// Stops both workers, drops every subscriber, and closes the
    /// listener. Can be restarted with [`Publisher::start`].
    pub async fn close(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.buffer.clear().await;
        self.registry.clear().await;
        if let Some(tasks) = self.tasks.lock().await.take() {
            tasks.acceptor.abort();
            tasks.broadcaster.abort();
        }
    }
}
