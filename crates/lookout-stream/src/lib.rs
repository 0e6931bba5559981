//! # lookout-stream
//!
//! The push half of the tracker client: one WebSocket connection, envelope
//! classification, and synchronous fan-out to subscribers.
//!
//! ```text
//! ConnectionManager ──text──▶ parse_envelope ──Arc<Envelope>──▶ BroadcastHub ──▶ subscribers
//! ```

#![deny(unsafe_code)]

pub mod connection;
pub mod hub;
pub mod parser;
pub mod transport;

pub use connection::{ConnectionManager, ConnectionState, StreamCounters};
pub use hub::{BroadcastHub, Subscriber, SubscriberId};
pub use parser::{decode_envelope, parse_envelope};
pub use transport::{Connector, Transport, WsConnector, WsTransport};
