use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use muxstream_frame::{Handshake, HANDSHAKE_LEN};
use muxstream_transport::{MessageConnector, MessageSink, MessageSource, WireMessage};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::{limit, next_adapter_id, within, AdapterEvent, EventSender, DEFAULT_CONNECT_TIMEOUT};
use crate::error::{Result, StreamError};

/// Options for the message-framed adapter.
#[derive(Clone)]
pub struct MessageOptions {
    pub connector: Arc<dyn MessageConnector>,
    /// Bound on connecting plus receiving the handshake. Zero means unlimited.
    pub connect_timeout: Duration,
}

impl MessageOptions {
    pub fn new(connector: impl MessageConnector + 'static) -> Self {
        Self {
            connector: Arc::new(connector),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    #[cfg(feature = "websocket")]
    pub fn websocket(url: impl Into<String>) -> Self {
        Self::new(muxstream_transport::WebSocketConnector::new(url))
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[cfg(feature = "websocket")]
impl Default for MessageOptions {
    fn default() -> Self {
        Self::new(muxstream_transport::WebSocketConnector::default())
    }
}

impl std::fmt::Debug for MessageOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageOptions")
            .field("peer", &self.connector.peer())
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// One frame per binary message, over a message transport such as WebSocket.
///
/// The server speaks first: its first message is the 16-byte handshake.
/// There is no heartbeat; liveness is left to the transport.
pub struct MessageAdapter {
    id: u64,
    options: MessageOptions,
    sink: Mutex<Option<MessageSink>>,
    handshake: OnceLock<Handshake>,
    closed_by_self: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl MessageAdapter {
    pub fn new(options: MessageOptions) -> Self {
        Self {
            id: next_adapter_id(),
            options,
            sink: Mutex::new(None),
            handshake: OnceLock::new(),
            closed_by_self: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn connect(&self, events: EventSender) -> Result<Handshake> {
        let peer = self.options.connector.peer();

        let opened = tokio::select! {
            _ = self.cancel.cancelled() => return Err(StreamError::closed_by_self()),
            opened = within(limit(self.options.connect_timeout), self.open()) => opened,
        };
        let (sink, source, handshake) = opened.map_err(|_| {
            StreamError::ConnectionTimeout(format!(
                "connect to {peer} timed out after {:?}",
                self.options.connect_timeout
            ))
        })??;

        if self.closed_by_self.load(Ordering::Acquire) {
            return Err(StreamError::closed_by_self());
        }

        *self.sink.lock().await = Some(sink);
        let _ = self.handshake.set(handshake.clone());

        info!(
            adapter = self.id,
            peer = %peer,
            connect_id = %handshake.connect_id,
            "message transport connected"
        );
        debug!(adapter = self.id, handshake = %handshake, "negotiated");

        tokio::spawn(read_loop(
            self.id,
            source,
            events,
            handshake.max_bytes as usize,
            self.closed_by_self.clone(),
            self.cancel.clone(),
        ));
        Ok(handshake)
    }

    async fn open(&self) -> Result<(MessageSink, MessageSource, Handshake)> {
        let (sink, mut source) = self
            .options
            .connector
            .connect()
            .await
            .map_err(|err| StreamError::from_transport("connect", err))?;

        let handshake = match source.next().await {
            Some(Ok(WireMessage::Binary(data))) if data.len() == HANDSHAKE_LEN => {
                Handshake::parse(&data).map_err(|err| StreamError::fatal_frame("handshake", err))?
            }
            Some(Ok(WireMessage::Binary(_))) => {
                return Err(StreamError::connection("handshake size error"))
            }
            Some(Ok(_)) => return Err(StreamError::connection("handshake type error")),
            Some(Err(err)) => return Err(StreamError::from_transport("read handshake", err)),
            None => {
                return Err(StreamError::connection(
                    "connection closed before handshake",
                ))
            }
        };

        Ok((sink, source, handshake))
    }

    pub async fn send(&self, payload: Bytes) -> Result<()> {
        let Some(handshake) = self.handshake.get() else {
            return Err(StreamError::connection("not connected"));
        };
        if payload.len() > handshake.max_bytes as usize {
            return Err(StreamError::generic(format!(
                "request size {} exceeds max bytes {}",
                payload.len(),
                handshake.max_bytes
            )));
        }

        let len = payload.len();
        let mut guard = self.sink.lock().await;
        let Some(sink) = guard.as_mut() else {
            return Err(StreamError::connection("connection closed"));
        };

        tokio::select! {
            _ = self.cancel.cancelled() => Err(StreamError::connection("connection closed")),
            result = within(handshake.frame_deadline(), sink.send(payload)) => match result {
                Err(_) => Err(StreamError::ConnectionTimeout(format!(
                    "write timed out after {:?}",
                    handshake.frame_timeout
                ))),
                Ok(Err(err)) => Err(StreamError::from_transport("write", err)),
                Ok(Ok(())) => {
                    trace!(adapter = self.id, len, "message written");
                    Ok(())
                }
            },
        }
    }

    pub async fn close(&self) {
        if self.closed_by_self.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();

        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            let _ = within(limit(self.options.connect_timeout), sink.close()).await;
        }
        debug!(adapter = self.id, "message transport closed");
    }

    pub fn abort(&self) {
        self.closed_by_self.store(true, Ordering::Release);
        self.cancel.cancel();
    }
}

impl Drop for MessageAdapter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for MessageAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageAdapter")
            .field("id", &self.id)
            .field("options", &self.options)
            .field("handshake", &self.handshake.get())
            .finish()
    }
}

async fn read_loop(
    id: u64,
    mut source: MessageSource,
    events: EventSender,
    max_bytes: usize,
    closed_by_self: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let err = loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => return,
            item = source.next() => item,
        };

        match item {
            Some(Ok(WireMessage::Binary(data))) if data.len() > max_bytes => {
                break StreamError::connection(format!(
                    "received too large message (len={}), max {max_bytes}",
                    data.len()
                ));
            }
            Some(Ok(WireMessage::Binary(data))) => {
                if events.send(AdapterEvent::Message(data)).is_err() {
                    return;
                }
            }
            Some(Ok(WireMessage::Text(_))) => {
                break StreamError::connection("message type error: unexpected text message");
            }
            Some(Ok(WireMessage::Close(reason))) => {
                break StreamError::connection(format!(
                    "closed by peer: {}",
                    reason.filter(|r| !r.is_empty()).unwrap_or_else(|| "no reason".to_string())
                ));
            }
            Some(Err(err)) => break StreamError::from_transport("read", err),
            None => break StreamError::connection("connection closed by peer"),
        }
    };

    if closed_by_self.load(Ordering::Acquire) {
        return;
    }
    debug!(adapter = id, error = %err, "message transport failed");
    let _ = events.send(AdapterEvent::Error(err));
}
