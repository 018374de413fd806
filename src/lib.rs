//! `fanio` — a lightweight publish/subscribe messaging fabric over TCP.
//!
//! A single [`publisher::Publisher`] binds a port and admits a small
//! fixed number of named [`subscriber::Subscriber`]s; every message is
//! fan-out broadcast, framed, escaped, and individually acknowledged.
//! Subscribers auto-reconnect on loss, reassemble framed messages out of
//! a raw byte stream, and dispatch each decoded payload to a user
//! handler.
//!
//! This crate covers the wire protocol and the publisher/subscriber
//! workers only — CLI, packaging, and the handler body are left to the
//! embedder.

pub mod error;
pub mod publisher;
pub mod subscriber;
pub mod wire;

pub use error::{DecodeError, PublisherError, SubscriberError};
pub use publisher::{NoopPublisherHandler, Publisher, PublisherHandler, PublisherOptions};
pub use subscriber::{NoopSubscriberHandler, Subscriber, SubscriberHandler, SubscriberOptions};
pub use wire::message::{Message, Payload};
pub use wire::value::Value;
