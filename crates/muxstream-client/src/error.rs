use std::error::Error as StdError;
use std::sync::Arc;

use muxstream_frame::FrameError;
use muxstream_transport::TransportError;

/// Errors surfaced by the client.
///
/// Connection-class errors ([`ConnectionTimeout`](Self::ConnectionTimeout),
/// [`Connection`](Self::Connection)) mean the connection is unusable; the
/// client reconnects on the next send. Everything else concerns one request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamError {
    /// Connecting or reading timed out.
    #[error("connection timeout: {0}")]
    ConnectionTimeout(String),

    /// The connection failed or was closed.
    #[error("connection error: {0}")]
    Connection(String),

    /// No response arrived within the caller's timeout.
    #[error("request timeout: {0}")]
    RequestTimeout(String),

    /// A request-level failure, including application errors reported by the server.
    #[error("{message}")]
    Generic {
        message: String,
        #[source]
        cause: Option<Arc<dyn StdError + Send + Sync>>,
    },
}

impl StreamError {
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
            cause: None,
        }
    }

    pub fn generic_with(
        message: impl Into<String>,
        cause: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Generic {
            message: message.into(),
            cause: Some(Arc::new(cause)),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::ConnectionTimeout(_) | Self::Connection(_))
    }

    pub fn is_timeout_error(&self) -> bool {
        matches!(self, Self::ConnectionTimeout(_) | Self::RequestTimeout(_))
    }

    pub(crate) fn canceled() -> Self {
        Self::generic("task canceled")
    }

    pub(crate) fn closed_by_self() -> Self {
        Self::connection("closed by self")
    }

    /// A frame error that ends the connection.
    pub(crate) fn fatal_frame(context: &str, err: FrameError) -> Self {
        match err {
            FrameError::Io(io) => Self::from_io(context, io),
            other => Self::Connection(format!("{context}: {other}")),
        }
    }

    /// A transport error observed while the connection is live.
    pub(crate) fn from_transport(context: &str, err: TransportError) -> Self {
        match err {
            TransportError::Io(io) | TransportError::Connect { source: io, .. } => {
                Self::from_io(context, io)
            }
            other => Self::Connection(format!("{context}: {other}")),
        }
    }

    pub(crate) fn from_io(context: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => Self::ConnectionTimeout(format!("{context}: {err}")),
            _ => Self::Connection(format!("{context}: {err}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
