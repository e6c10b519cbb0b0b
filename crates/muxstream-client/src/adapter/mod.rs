//! Transport adapters.
//!
//! An adapter owns one physical connection: it runs the handshake, frames
//! outbound payloads, and reports inbound payloads and failures as
//! [`AdapterEvent`]s on a channel handed to it at connect time.
//!
//! Contract shared by both variants:
//! - `connect` errors are returned, never reported as events
//! - after `connect` succeeds, anything that ends the connection is reported
//!   once as [`AdapterEvent::Error`]
//! - `send` returns only the error of that one write
//! - nothing is reported after `close` or `abort`

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use muxstream_frame::Handshake;
use tokio::sync::mpsc;
use tokio::time::error::Elapsed;

use crate::error::Result;

mod heartbeat;
mod message;
mod stream;

pub use message::{MessageAdapter, MessageOptions};
pub use stream::{StreamAdapter, StreamOptions};

/// Default bound on connecting plus the handshake exchange.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Something an adapter observed on its connection.
#[derive(Debug, Clone)]
pub enum AdapterEvent {
    /// One complete inbound frame.
    Message(Bytes),
    /// The connection failed. Reported at most once.
    Error(crate::error::StreamError),
}

pub type EventSender = mpsc::UnboundedSender<AdapterEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<AdapterEvent>;

/// Builds a fresh, unconnected adapter for each new connection.
pub type AdapterFactory = Arc<dyn Fn() -> Adapter + Send + Sync>;

/// A transport adapter of either framing style.
#[derive(Debug)]
pub enum Adapter {
    /// Length-prefixed frames over a byte stream, with heartbeats.
    Stream(StreamAdapter),
    /// One frame per binary message.
    Message(MessageAdapter),
}

impl Adapter {
    /// Open the connection and run the handshake.
    pub async fn connect(&self, events: EventSender) -> Result<Handshake> {
        match self {
            Adapter::Stream(adapter) => adapter.connect(events).await,
            Adapter::Message(adapter) => adapter.connect(events).await,
        }
    }

    /// Write one frame.
    pub async fn send(&self, frame: Bytes) -> Result<()> {
        match self {
            Adapter::Stream(adapter) => adapter.send(frame).await,
            Adapter::Message(adapter) => adapter.send(frame).await,
        }
    }

    /// Close the connection. Idempotent.
    pub async fn close(&self) {
        match self {
            Adapter::Stream(adapter) => adapter.close().await,
            Adapter::Message(adapter) => adapter.close().await,
        }
    }

    /// Stop background tasks without waiting for the close to be flushed.
    pub fn abort(&self) {
        match self {
            Adapter::Stream(adapter) => adapter.abort(),
            Adapter::Message(adapter) => adapter.abort(),
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            Adapter::Stream(adapter) => adapter.id(),
            Adapter::Message(adapter) => adapter.id(),
        }
    }
}

/// Factory for stream-framed adapters.
pub fn stream_factory(options: StreamOptions) -> AdapterFactory {
    Arc::new(move || Adapter::Stream(StreamAdapter::new(options.clone())))
}

/// Factory for message-framed adapters.
pub fn message_factory(options: MessageOptions) -> AdapterFactory {
    Arc::new(move || Adapter::Message(MessageAdapter::new(options.clone())))
}

pub(crate) fn next_adapter_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Zero means unlimited throughout the protocol.
pub(crate) fn limit(duration: Duration) -> Option<Duration> {
    (!duration.is_zero()).then_some(duration)
}

pub(crate) async fn within<F: Future>(
    limit: Option<Duration>,
    fut: F,
) -> std::result::Result<F::Output, Elapsed> {
    match limit {
        Some(duration) => tokio::time::timeout(duration, fut).await,
        None => Ok(fut.await),
    }
}
