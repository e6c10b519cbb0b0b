use std::pin::Pin;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::Sink;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Result, TransportError};

/// A connected byte stream: anything readable and writable from a task.
///
/// TCP sockets, TLS streams and in-memory duplex pipes all qualify.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// Type-erased byte stream returned by [`StreamConnector::connect`].
pub type BoxedIo = Box<dyn AsyncStream>;

/// Opens byte-stream connections to one fixed peer.
pub trait StreamConnector: Send + Sync {
    /// Open a new connection.
    fn connect(&self) -> BoxFuture<'_, Result<BoxedIo>>;

    /// Human-readable peer address, used in logs and error messages.
    fn peer(&self) -> String;
}

/// One inbound unit from a message transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// A binary message; the only kind that carries frames.
    Binary(Bytes),
    /// A text message.
    Text(String),
    /// The peer started a close, with its reason if one was given.
    Close(Option<String>),
}

/// Outbound half of a message transport. Each item becomes one binary message.
pub type MessageSink = Pin<Box<dyn Sink<Bytes, Error = TransportError> + Send>>;

/// Inbound half of a message transport.
///
/// Transport-level keepalives (ping/pong) never show up here. The stream
/// ending means the connection is gone.
pub type MessageSource = BoxStream<'static, Result<WireMessage>>;

/// Opens message-transport connections to one fixed peer.
pub trait MessageConnector: Send + Sync {
    /// Open a new connection and return its two halves.
    fn connect(&self) -> BoxFuture<'_, Result<(MessageSink, MessageSource)>>;

    /// Human-readable peer address, used in logs and error messages.
    fn peer(&self) -> String;
}
