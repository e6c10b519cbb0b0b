//! Wire formats for the muxstream protocol.
//!
//! Three layers live here:
//! - the 16-byte [`Handshake`] the server sends on connect, and the 6-byte
//!   handshake request a byte-stream client sends first
//! - the length-prefixed stream framing ([`LengthCodec`]), with zero-length
//!   frames used as heartbeats
//! - the application frames: requests with headers, responses, and the
//!   push/ack sub-protocol on request id 1

pub mod error;
pub mod handshake;
pub mod length;
pub mod message;

pub use error::{FrameError, Result};
pub use handshake::{
    build_handshake_request, handshake_request, verify_handshake_request, ConnectId, Handshake,
    DEFAULT_MAX_BYTES, HANDSHAKE_LEN, HANDSHAKE_REQUEST_LEN, PROTOCOL_VERSION,
};
pub use length::{payload_len, LengthCodec, LengthFrame, LENGTH_PREFIX};
pub use message::{
    encode_push_ack, encode_request, Request, Response, Status, MAX_HEADER_LEN, PUSH_REQ_ID,
};
