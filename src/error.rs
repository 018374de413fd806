//! Error taxonomy for the three subsystems: transient I/O is recovered
//! locally and never reaches these types; protocol violations and decode
//! failures are observed by the reader loops but do not propagate as
//! faults; only fatal setup errors surface to the embedder.

use thiserror::Error;

/// Errors surfaced to the caller of [`crate::publisher::Publisher::start`]
/// or other publisher-side entry points that can fail outright.
#[derive(Error, Debug)]
pub enum PublisherError {
    #[error("failed to bind publisher socket: {0}")]
    Bind(#[source] std::io::Error),
    #[error("publisher is not running")]
    NotRunning,
}

/// Errors surfaced to the caller of [`crate::subscriber::Subscriber`]
/// constructors.
#[derive(Error, Debug)]
pub enum SubscriberError {
    #[error("subscriber name must be 1..={max} bytes", max = crate::wire::NAME_LEN)]
    InvalidName,
}

/// Decode-time faults. These never propagate out of a reader loop — a
/// malformed payload is handed to `process` wrapped as its raw bytes,
/// with the error recorded via `tracing::warn!`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("unknown type code {0:?}")]
    UnknownCode(u8),
    #[error("malformed extended-json payload")]
    MalformedJson,
    #[error("timezone {0:?} is not a well-formed zone identifier")]
    UnknownTimezone(String),
}
