//! Transport abstraction for muxstream.
//!
//! Two physical transport shapes are supported:
//! - byte streams ([`StreamConnector`], e.g. TCP), which the client frames
//!   with a length prefix
//! - message transports ([`MessageConnector`], e.g. WebSocket), where one
//!   binary message carries exactly one frame
//!
//! This is the lowest layer of muxstream. Everything else builds on top of
//! the connector traits provided here.

pub mod error;
pub mod tcp;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod ws;

pub use error::{Result, TransportError};
pub use tcp::TcpConnector;
pub use traits::{
    AsyncStream, BoxedIo, MessageConnector, MessageSink, MessageSource, StreamConnector,
    WireMessage,
};

#[cfg(feature = "websocket")]
pub use ws::WebSocketConnector;
