use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{FrameError, Result};

/// Size of the handshake response sent by the server.
pub const HANDSHAKE_LEN: usize = 2 + 1 + 1 + 4 + 8;

/// Size of the handshake request sent by the client on byte streams.
pub const HANDSHAKE_REQUEST_LEN: usize = 6;

/// Protocol version carried in the first byte of the handshake request.
pub const PROTOCOL_VERSION: u8 = 2;

/// Frame size limit assumed before a handshake has been negotiated: 10 MiB.
pub const DEFAULT_MAX_BYTES: u32 = 10 * 1024 * 1024;

/// Server-assigned connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectId(pub u64);

impl fmt::Display for ConnectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Per-connection parameters negotiated during the handshake.
///
/// Wire format (16 bytes, big-endian):
/// ```text
/// ┌──────────────┬──────────────┬───────────────┬────────────┬─────────────┐
/// │ Heartbeat s  │ FrameTimeout │ MaxConcurrent │ MaxBytes   │ ConnectId   │
/// │ (2B)         │ s (1B)       │ (1B)          │ (4B)       │ (8B)        │
/// └──────────────┴──────────────┴───────────────┴────────────┴─────────────┘
/// ```
///
/// A zero heartbeat interval or frame timeout means "no limit".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// How often each side sends a heartbeat on an idle byte stream.
    pub heartbeat_interval: Duration,
    /// Upper bound for reading or writing the body of one frame.
    pub frame_timeout: Duration,
    /// Requests the server accepts concurrently on this connection.
    pub max_concurrent: u8,
    /// Largest frame either side may send, in bytes.
    pub max_bytes: u32,
    /// Server-assigned identifier, for logs.
    pub connect_id: ConnectId,
}

impl Handshake {
    /// Parse the 16-byte handshake response.
    pub fn parse(mut src: &[u8]) -> Result<Self> {
        if src.len() < HANDSHAKE_LEN {
            return Err(FrameError::Truncated {
                needed: HANDSHAKE_LEN,
                actual: src.len(),
            });
        }

        let heartbeat = src.get_u16();
        let frame_timeout = src.get_u8();
        let max_concurrent = src.get_u8();
        let max_bytes = src.get_u32();
        let connect_id = src.get_u64();

        Ok(Self {
            heartbeat_interval: Duration::from_secs(u64::from(heartbeat)),
            frame_timeout: Duration::from_secs(u64::from(frame_timeout)),
            max_concurrent,
            max_bytes,
            connect_id: ConnectId(connect_id),
        })
    }

    /// Encode into the 16-byte wire form. Durations are truncated to whole
    /// seconds and saturate at the field width.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HANDSHAKE_LEN);
        dst.put_u16(u16::try_from(self.heartbeat_interval.as_secs()).unwrap_or(u16::MAX));
        dst.put_u8(u8::try_from(self.frame_timeout.as_secs()).unwrap_or(u8::MAX));
        dst.put_u8(self.max_concurrent);
        dst.put_u32(self.max_bytes);
        dst.put_u64(self.connect_id.0);
    }

    /// Encode into a fresh 16-byte array.
    pub fn to_bytes(&self) -> [u8; HANDSHAKE_LEN] {
        let mut buf = BytesMut::with_capacity(HANDSHAKE_LEN);
        self.encode(&mut buf);
        let mut out = [0u8; HANDSHAKE_LEN];
        out.copy_from_slice(&buf);
        out
    }

    /// The frame timeout as an optional deadline; `None` when unlimited.
    pub fn frame_deadline(&self) -> Option<Duration> {
        (!self.frame_timeout.is_zero()).then_some(self.frame_timeout)
    }
}

impl fmt::Display for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ConnectId: {}, MaxConcurrent: {}, HeartbeatInterval: {:?}, MaxBytes/frame: {}, FrameTimeout: {:?}}}",
            self.connect_id,
            self.max_concurrent,
            self.heartbeat_interval,
            self.max_bytes,
            self.frame_timeout
        )
    }
}

/// Build a handshake request with a fresh nonce.
///
/// ```text
/// version(1)=2 | random(4) | checksum(1)
/// ```
/// The checksum makes the XOR of all six bytes equal 0xFF.
pub fn handshake_request() -> [u8; HANDSHAKE_REQUEST_LEN] {
    build_handshake_request(nonce())
}

/// Build a handshake request around a caller-chosen nonce.
pub fn build_handshake_request(nonce: u32) -> [u8; HANDSHAKE_REQUEST_LEN] {
    let mut req = [0u8; HANDSHAKE_REQUEST_LEN];
    req[0] = PROTOCOL_VERSION;
    req[1..5].copy_from_slice(&nonce.to_be_bytes());
    req[5] = req[..5].iter().fold(0xFF, |acc, b| acc ^ b);
    req
}

/// Validate a handshake request as a server would.
pub fn verify_handshake_request(req: &[u8]) -> Result<()> {
    if req.len() != HANDSHAKE_REQUEST_LEN {
        return Err(FrameError::InvalidHandshakeRequest("wrong length"));
    }
    if req[0] != PROTOCOL_VERSION {
        return Err(FrameError::InvalidHandshakeRequest("unsupported version"));
    }
    if req.iter().fold(0u8, |acc, b| acc ^ b) != 0xFF {
        return Err(FrameError::InvalidHandshakeRequest("bad checksum"));
    }
    Ok(())
}

// Not cryptographic; the nonce only has to differ between connections.
fn nonce() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let pid = u64::from(std::process::id());
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let mixed = (nanos ^ seq.rotate_left(32)).wrapping_mul(0x517cc1b727220a95) ^ pid;
    (mixed >> 16) as u32
}
