/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The buffer ended before the fixed-size part of a frame.
    #[error("frame truncated ({actual} bytes, need at least {needed})")]
    Truncated { needed: usize, actual: usize },

    /// A header key or value does not fit its one-byte length prefix.
    #[error("header {field} too long ({len} bytes, max 255)")]
    HeaderTooLong { field: &'static str, len: usize },

    /// A header block was not terminated before the end of the frame.
    #[error("unterminated header block")]
    UnterminatedHeaders,

    /// A header key or value is not valid UTF-8.
    #[error("header is not valid utf-8")]
    InvalidHeader,

    /// A stream length prefix that is neither a heartbeat nor a valid frame.
    #[error("invalid frame length {0}")]
    InvalidLength(u32),

    /// The frame exceeds the negotiated maximum size.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The 6-byte handshake request failed validation.
    #[error("invalid handshake request: {0}")]
    InvalidHandshakeRequest(&'static str),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
