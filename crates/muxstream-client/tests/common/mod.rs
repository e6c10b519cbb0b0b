//! In-memory peers for exercising the client without sockets.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use muxstream_client::{Client, ConnectId, Handshake, MessageOptions, StreamError, StreamOptions};
use muxstream_frame::{
    verify_handshake_request, LengthCodec, LengthFrame, Request, Response, HANDSHAKE_REQUEST_LEN,
};
use muxstream_transport::{
    BoxedIo, MessageConnector, MessageSink, MessageSource, StreamConnector, TransportError,
    WireMessage,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

pub fn handshake(max_concurrent: u8, max_bytes: u32, heartbeat_secs: u64) -> Handshake {
    Handshake {
        heartbeat_interval: Duration::from_secs(heartbeat_secs),
        frame_timeout: Duration::from_secs(5),
        max_concurrent,
        max_bytes,
        connect_id: ConnectId(0xfeed_0000_0000_0001),
    }
}

fn refused(addr: &str) -> TransportError {
    TransportError::Connect {
        addr: addr.to_string(),
        source: io::Error::new(io::ErrorKind::ConnectionRefused, "no more scripted connections"),
    }
}

/// Collects callback invocations so tests can await them.
pub struct Recorder<T> {
    tx: mpsc::UnboundedSender<T>,
    pub rx: mpsc::UnboundedReceiver<T>,
}

impl<T: Send + 'static> Recorder<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub fn sender(&self) -> impl Fn(T) + Send + Sync + 'static {
        let tx = self.tx.clone();
        move |value| {
            let _ = tx.send(value);
        }
    }

    pub async fn next(&mut self) -> T {
        tokio::time::timeout(Duration::from_secs(60), self.rx.recv())
            .await
            .expect("callback not invoked in time")
            .expect("recorder closed")
    }

    /// True if nothing more arrives within `wait`.
    pub async fn quiet_for(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.rx.recv()).await.is_err()
    }
}

pub fn record_peer_closed(client: &Client) -> Recorder<StreamError> {
    let recorder = Recorder::new();
    client.on_peer_closed(recorder.sender());
    recorder
}

pub fn record_pushes(client: &Client) -> Recorder<Bytes> {
    let recorder = Recorder::new();
    client.on_push(recorder.sender());
    recorder
}

// ---------------------------------------------------------------------------
// Byte streams
// ---------------------------------------------------------------------------

/// Hands out pre-queued duplex streams, one per connect.
#[derive(Default)]
pub struct DuplexConnector {
    streams: Mutex<VecDeque<DuplexStream>>,
    attempts: AtomicUsize,
}

impl DuplexConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue one connection and return the server end.
    pub fn queue(&self) -> DuplexStream {
        self.queue_with_capacity(64 * 1024)
    }

    /// Like [`queue`](Self::queue), buffering at most `capacity` bytes per direction.
    pub fn queue_with_capacity(&self, capacity: usize) -> DuplexStream {
        let (client, server) = tokio::io::duplex(capacity);
        self.streams.lock().unwrap().push_back(client);
        server
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl StreamConnector for DuplexConnector {
    fn connect(&self) -> BoxFuture<'_, muxstream_transport::Result<BoxedIo>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = self.streams.lock().unwrap().pop_front();
        Box::pin(async move {
            match next {
                Some(stream) => Ok(Box::new(stream) as BoxedIo),
                None => Err(refused("duplex")),
            }
        })
    }

    fn peer(&self) -> String {
        "duplex".to_string()
    }
}

pub fn stream_client(connector: &Arc<DuplexConnector>) -> Arc<Client> {
    Arc::new(Client::with_stream(StreamOptions {
        connector: connector.clone(),
        connect_timeout: Duration::from_secs(30),
    }))
}

/// Server side of a length-framed stream.
pub struct StreamPeer {
    framed: Framed<DuplexStream, LengthCodec>,
}

impl StreamPeer {
    /// Check the client's handshake request and answer with `hs`.
    pub async fn accept(mut io: DuplexStream, hs: &Handshake) -> Self {
        let mut req = [0u8; HANDSHAKE_REQUEST_LEN];
        io.read_exact(&mut req).await.unwrap();
        verify_handshake_request(&req).unwrap();
        io.write_all(&hs.to_bytes()).await.unwrap();
        Self {
            framed: Framed::new(io, LengthCodec::new(hs.max_bytes)),
        }
    }

    /// Next frame of any kind.
    pub async fn recv_frame(&mut self) -> LengthFrame {
        self.framed
            .next()
            .await
            .expect("client hung up")
            .expect("bad frame from client")
    }

    /// Next payload frame, answering heartbeats along the way.
    pub async fn recv_payload(&mut self) -> Bytes {
        loop {
            match self.recv_frame().await {
                LengthFrame::Heartbeat => self.heartbeat().await,
                LengthFrame::Payload(payload) => return payload,
            }
        }
    }

    pub async fn recv_request(&mut self) -> Request {
        Request::decode(self.recv_payload().await).unwrap()
    }

    pub async fn reply(&mut self, resp: Response) {
        let mut buf = BytesMut::new();
        resp.encode(&mut buf);
        self.framed
            .send(LengthFrame::Payload(buf.freeze()))
            .await
            .unwrap();
    }

    pub async fn heartbeat(&mut self) {
        self.framed.send(LengthFrame::Heartbeat).await.unwrap();
    }

    /// Wait for the client to hang up, skipping any frames still in flight.
    pub async fn expect_eof(&mut self) {
        while let Some(frame) = self.framed.next().await {
            if frame.is_err() {
                return;
            }
        }
    }

    /// Write bytes past the codec, for malformed input.
    pub async fn send_raw(&mut self, raw: &[u8]) {
        let io = self.framed.get_mut();
        io.write_all(raw).await.unwrap();
        io.flush().await.unwrap();
    }
}

/// Queue a stream connection and complete its handshake while `client` connects.
pub async fn connect_stream(
    client: &Arc<Client>,
    connector: &Arc<DuplexConnector>,
    hs: &Handshake,
) -> StreamPeer {
    let server = connector.queue();
    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.recover().await }
    });
    let peer = StreamPeer::accept(server, hs).await;
    connecting.await.unwrap().unwrap();
    peer
}

// ---------------------------------------------------------------------------
// Message transports
// ---------------------------------------------------------------------------

/// Sink side of a scripted message link. Fails the next `failures` sends.
struct ScriptedSink {
    tx: mpsc::UnboundedSender<Bytes>,
    failures: Arc<AtomicUsize>,
}

impl futures_util::Sink<Bytes> for ScriptedSink {
    type Error = TransportError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Bytes) -> Result<(), Self::Error> {
        let failures = &self.failures;
        if failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "scripted write failure",
            )));
        }
        self.tx
            .send(item)
            .map_err(|_| TransportError::Io(io::ErrorKind::BrokenPipe.into()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

/// Server side of a scripted message link.
pub struct MessagePeer {
    outbound: Option<mpsc::UnboundedSender<muxstream_transport::Result<WireMessage>>>,
    inbound: mpsc::UnboundedReceiver<Bytes>,
    failures: Arc<AtomicUsize>,
}

impl MessagePeer {
    pub fn send(&self, msg: WireMessage) {
        if let Some(outbound) = &self.outbound {
            let _ = outbound.send(Ok(msg));
        }
    }

    pub fn send_handshake(&self, hs: &Handshake) {
        self.send(WireMessage::Binary(Bytes::copy_from_slice(&hs.to_bytes())));
    }

    pub fn reply(&self, resp: Response) {
        let mut buf = BytesMut::new();
        resp.encode(&mut buf);
        self.send(WireMessage::Binary(buf.freeze()));
    }

    pub async fn recv(&mut self) -> Bytes {
        self.inbound.recv().await.expect("client hung up")
    }

    pub async fn recv_request(&mut self) -> Request {
        Request::decode(self.recv().await).unwrap()
    }

    /// Make the client's next `n` writes fail.
    pub fn fail_writes(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// End the inbound stream, as a dropped connection would.
    pub fn hang_up(&mut self) {
        self.outbound = None;
    }
}

/// Hands out pre-queued message links, one per connect.
#[derive(Default)]
pub struct ScriptedConnector {
    links: Mutex<VecDeque<(MessageSink, MessageSource)>>,
    attempts: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue one link and return its server side.
    pub fn queue(&self) -> MessagePeer {
        let (to_client, from_server) = mpsc::unbounded_channel();
        let (to_server, from_client) = mpsc::unbounded_channel();
        let failures = Arc::new(AtomicUsize::new(0));

        let sink: MessageSink = Box::pin(ScriptedSink {
            tx: to_server,
            failures: failures.clone(),
        });
        let source: MessageSource = futures_util::stream::unfold(from_server, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed();
        self.links.lock().unwrap().push_back((sink, source));

        MessagePeer {
            outbound: Some(to_client),
            inbound: from_client,
            failures,
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl MessageConnector for ScriptedConnector {
    fn connect(&self) -> BoxFuture<'_, muxstream_transport::Result<(MessageSink, MessageSource)>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = self.links.lock().unwrap().pop_front();
        Box::pin(async move { next.ok_or_else(|| refused("scripted")) })
    }

    fn peer(&self) -> String {
        "scripted".to_string()
    }
}

pub fn message_options(connector: &Arc<ScriptedConnector>) -> MessageOptions {
    MessageOptions {
        connector: connector.clone(),
        connect_timeout: Duration::from_secs(30),
    }
}

pub fn message_client(connector: &Arc<ScriptedConnector>) -> Arc<Client> {
    Arc::new(Client::with_messages(message_options(connector)))
}

/// Queue a link whose server side has already sent `hs`, then connect.
pub async fn connect_messages(
    client: &Client,
    connector: &ScriptedConnector,
    hs: &Handshake,
) -> MessagePeer {
    let peer = connector.queue();
    peer.send_handshake(hs);
    client.recover().await.unwrap();
    peer
}
