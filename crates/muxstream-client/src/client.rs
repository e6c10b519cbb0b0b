use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use bytes::Bytes;
use muxstream_frame::Handshake;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::adapter::{
    message_factory, stream_factory, AdapterFactory, MessageOptions, StreamOptions,
};
use crate::callbacks::Callbacks;
use crate::config::{ClientConfig, ConfigError, TransportConfig};
use crate::connection::Connection;
use crate::error::{Result, StreamError};

/// Default time to wait for a response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Header carrying the id added by [`Client::send_with_correlation_id`].
pub const CORRELATION_HEADER: &str = "X-Req-Id";

/// Request headers.
pub type Headers = HashMap<String, String>;

/// Multiplexed request/response client.
///
/// Owns at most one live [`Connection`], created on first use and replaced
/// after it fails or is closed. Sends that fail on a broken connection are
/// retried once on a fresh one.
///
/// ```no_run
/// # async fn demo() -> Result<(), muxstream_client::StreamError> {
/// use muxstream_client::{Client, Headers, StreamOptions, DEFAULT_REQUEST_TIMEOUT};
///
/// let client = Client::with_stream(StreamOptions::tcp("127.0.0.1", 8080));
/// client.on_push(|body| println!("push: {} bytes", body.len()));
///
/// let mut headers = Headers::new();
/// headers.insert("api".into(), "/echo".into());
/// let reply = client.send(b"hello", &headers, DEFAULT_REQUEST_TIMEOUT).await?;
/// # let _ = reply;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    factory: RwLock<AdapterFactory>,
    current: Mutex<Option<Connection>>,
    callbacks: Arc<Callbacks>,
}

impl Client {
    pub fn new(factory: AdapterFactory) -> Self {
        Self {
            factory: RwLock::new(factory),
            current: Mutex::new(None),
            callbacks: Arc::new(Callbacks::default()),
        }
    }

    /// Client over a length-framed byte stream.
    pub fn with_stream(options: StreamOptions) -> Self {
        Self::new(stream_factory(options))
    }

    /// Client over a message transport.
    pub fn with_messages(options: MessageOptions) -> Self {
        Self::new(message_factory(options))
    }

    pub fn from_config(config: &ClientConfig) -> std::result::Result<Self, ConfigError> {
        match &config.transport {
            TransportConfig::Tcp { host, port } => Ok(Self::with_stream(
                StreamOptions::tcp(host.clone(), *port)
                    .with_connect_timeout(config.connect_timeout()),
            )),
            #[cfg(feature = "websocket")]
            TransportConfig::WebSocket { url } => Ok(Self::with_messages(
                MessageOptions::websocket(url.clone())
                    .with_connect_timeout(config.connect_timeout()),
            )),
            #[cfg(not(feature = "websocket"))]
            TransportConfig::WebSocket { .. } => Err(ConfigError::Unsupported("websocket")),
        }
    }

    /// Handle server pushes. Replaces any previous handler.
    pub fn on_push(&self, handler: impl Fn(Bytes) + Send + Sync + 'static) {
        self.callbacks.set_push(Arc::new(handler));
    }

    /// Handle loss of an established connection. Not called for [`close`](Self::close).
    pub fn on_peer_closed(&self, handler: impl Fn(StreamError) + Send + Sync + 'static) {
        self.callbacks.set_peer_closed(Arc::new(handler));
    }

    /// Send one request and return the response body.
    ///
    /// A connection-class failure is retried once on a new connection. If
    /// that reconnect fails, the first error is returned.
    pub async fn send(&self, body: &[u8], headers: &Headers, timeout: Duration) -> Result<Bytes> {
        let conn = self.connection().await;
        conn.connect().await?;

        let first = match conn.send(body, headers, timeout).await {
            Ok(reply) => return Ok(reply),
            Err(err) if !err.is_connection_error() => return Err(err),
            Err(err) => err,
        };

        warn!(connection = conn.id(), error = %first, "send failed, retrying on a new connection");
        let conn = self.connection().await;
        if let Err(err) = conn.connect().await {
            debug!(connection = conn.id(), error = %err, "reconnect failed");
            return Err(first);
        }
        conn.send(body, headers, timeout).await
    }

    /// [`send`](Self::send) with an `X-Req-Id` header holding a fresh UUID,
    /// for tracing a request through server logs.
    pub async fn send_with_correlation_id(
        &self,
        body: &[u8],
        headers: &Headers,
        timeout: Duration,
    ) -> Result<Bytes> {
        let mut headers = headers.clone();
        headers.insert(
            CORRELATION_HEADER.to_string(),
            uuid::Uuid::new_v4().to_string(),
        );
        self.send(body, &headers, timeout).await
    }

    /// Connect now, without sending anything.
    pub async fn recover(&self) -> Result<()> {
        self.connection().await.connect().await
    }

    /// Close the current connection. The client stays usable; the next send
    /// opens a new connection.
    pub async fn close(&self) {
        let current = self.current.lock().await.clone();
        if let Some(conn) = current {
            conn.close().await;
        }
    }

    /// Use `factory` for connections created from now on.
    pub fn update_protocol(&self, factory: AdapterFactory) {
        *self.factory.write().unwrap_or_else(PoisonError::into_inner) = factory;
    }

    pub fn update_stream_options(&self, options: StreamOptions) {
        self.update_protocol(stream_factory(options));
    }

    pub fn update_message_options(&self, options: MessageOptions) {
        self.update_protocol(message_factory(options));
    }

    /// Parameters negotiated by the current connection, if it is up.
    pub async fn handshake(&self) -> Option<Handshake> {
        let current = self.current.lock().await.clone();
        match current {
            Some(conn) => conn.handshake().await,
            None => None,
        }
    }

    async fn connection(&self) -> Connection {
        let mut current = self.current.lock().await;
        if let Some(conn) = current.as_ref() {
            if !conn.is_invalidated() {
                return conn.clone();
            }
        }

        let factory = self
            .factory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let conn = Connection::new(factory(), self.callbacks.clone());
        debug!(connection = conn.id(), "new connection");
        *current = Some(conn.clone());
        conn
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(conn) = self.current.get_mut() {
            conn.abort();
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("callbacks", &self.callbacks)
            .finish_non_exhaustive()
    }
}
