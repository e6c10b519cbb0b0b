//! Multiplexed request/response client.
//!
//! Many callers share one connection. Each request gets a request id, waits
//! for the response carrying that id, and is bounded by the server's
//! concurrency limit. Server pushes arrive on a callback and are acked
//! automatically. Broken connections are replaced on the next send, with a
//! single retry for requests that hit the failure.
//!
//! Layers, top to bottom:
//! - [`Client`]: owns the current connection, retry policy and callbacks
//! - [`Connection`]: state machine and pending-request table for one connection
//! - [`Adapter`]: handshake and framing for a stream or message transport

pub mod adapter;
pub mod callbacks;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;

pub use adapter::{
    message_factory, stream_factory, Adapter, AdapterEvent, AdapterFactory, MessageAdapter,
    MessageOptions, StreamAdapter, StreamOptions, DEFAULT_CONNECT_TIMEOUT,
};
pub use callbacks::{Callbacks, PeerClosedHandler, PushHandler};
pub use client::{Client, Headers, CORRELATION_HEADER, DEFAULT_REQUEST_TIMEOUT};
pub use config::{ClientConfig, ConfigError, TransportConfig};
pub use connection::{Connection, REQ_ID_START};
pub use error::{Result, StreamError};
pub use muxstream_frame::{ConnectId, Handshake};
