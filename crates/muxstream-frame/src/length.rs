use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::error::{FrameError, Result};
use crate::handshake::DEFAULT_MAX_BYTES;

/// Size of the length prefix on byte-stream frames.
pub const LENGTH_PREFIX: usize = 4;

/// One unit on a length-framed byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LengthFrame {
    /// A zero length prefix with no payload.
    Heartbeat,
    /// An application frame.
    Payload(Bytes),
}

/// Validate a received length prefix.
///
/// The prefix counts itself, so a frame carrying `n` payload bytes has
/// length `n + 4`. Returns `None` for a heartbeat, otherwise the number of
/// payload bytes that follow. `max_bytes` bounds the whole frame.
pub fn payload_len(length: u32, max_bytes: u32) -> Result<Option<usize>> {
    if length == 0 {
        return Ok(None);
    }
    if (length as usize) < LENGTH_PREFIX {
        return Err(FrameError::InvalidLength(length));
    }
    if length > max_bytes {
        return Err(FrameError::FrameTooLarge {
            size: length as usize,
            max: max_bytes as usize,
        });
    }
    Ok(Some(length as usize - LENGTH_PREFIX))
}

/// `tokio_util` codec for the stream framing:
///
/// ```text
/// ┌──────────────┬─────────────────────┐
/// │ Length (4B)  │ Payload             │
/// │ big-endian   │ (Length - 4 bytes)  │
/// └──────────────┴─────────────────────┘
/// ```
#[derive(Debug, Clone, Copy)]
pub struct LengthCodec {
    max_bytes: u32,
}

impl LengthCodec {
    pub fn new(max_bytes: u32) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> u32 {
        self.max_bytes
    }
}

impl Default for LengthCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BYTES)
    }
}

impl Decoder for LengthCodec {
    type Item = LengthFrame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<LengthFrame>> {
        if src.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]);
        let Some(payload) = payload_len(length, self.max_bytes)? else {
            src.advance(LENGTH_PREFIX);
            trace!("heartbeat frame");
            return Ok(Some(LengthFrame::Heartbeat));
        };

        if src.len() < LENGTH_PREFIX + payload {
            src.reserve(LENGTH_PREFIX + payload - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX);
        Ok(Some(LengthFrame::Payload(src.split_to(payload).freeze())))
    }
}

impl Encoder<LengthFrame> for LengthCodec {
    type Error = FrameError;

    fn encode(&mut self, item: LengthFrame, dst: &mut BytesMut) -> Result<()> {
        match item {
            LengthFrame::Heartbeat => {
                dst.put_u32(0);
                Ok(())
            }
            LengthFrame::Payload(payload) => Encoder::<Bytes>::encode(self, payload, dst),
        }
    }
}

impl Encoder<Bytes> for LengthCodec {
    type Error = FrameError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<()> {
        let size = payload.len() + LENGTH_PREFIX;
        if size > self.max_bytes as usize {
            return Err(FrameError::FrameTooLarge {
                size,
                max: self.max_bytes as usize,
            });
        }
        dst.reserve(size);
        dst.put_u32(size as u32);
        dst.put_slice(&payload);
        Ok(())
    }
}
