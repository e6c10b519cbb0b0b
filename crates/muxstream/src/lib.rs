//! Multiplexed request/response streams over TCP and WebSocket.
//!
//! Many concurrent requests share one connection to a server that answers
//! each one by request id, bounds in-flight requests, and may push
//! unsolicited messages that the client acknowledges.
//!
//! # Crate Structure
//!
//! - [`transport`]: connectors for TCP byte streams and WebSocket messages
//! - [`frame`]: handshake, length framing and request/response codecs
//! - [`client`]: the multiplexed client with reconnection and push delivery

/// Re-export transport types.
pub mod transport {
    pub use muxstream_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use muxstream_frame::*;
}

/// Re-export client types.
pub mod client {
    pub use muxstream_client::*;
}

pub use muxstream_client::{Client, ClientConfig, Headers, StreamError};
