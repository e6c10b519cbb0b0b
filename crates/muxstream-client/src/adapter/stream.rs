use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use muxstream_frame::{
    handshake_request, payload_len, FrameError, Handshake, LengthCodec, LengthFrame,
    HANDSHAKE_LEN, LENGTH_PREFIX,
};
use muxstream_transport::{BoxedIo, StreamConnector, TcpConnector};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_util::codec::Encoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::heartbeat::Heartbeat;
use super::{limit, next_adapter_id, within, AdapterEvent, EventSender, DEFAULT_CONNECT_TIMEOUT};
use crate::error::{Result, StreamError};

/// Options for the stream-framed adapter.
#[derive(Clone)]
pub struct StreamOptions {
    pub connector: Arc<dyn StreamConnector>,
    /// Bound on connecting plus the handshake exchange. Zero means unlimited.
    pub connect_timeout: Duration,
}

impl StreamOptions {
    pub fn new(connector: impl StreamConnector + 'static) -> Self {
        Self {
            connector: Arc::new(connector),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::new(TcpConnector::new(host, port))
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self::new(TcpConnector::default())
    }
}

impl std::fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamOptions")
            .field("peer", &self.connector.peer())
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Length-prefixed framing over a byte stream.
///
/// ```text
/// client                                   server
///   | version(1)=2 | random(4) | checksum(1) -->
///   <-- handshake (16 bytes)
///   | length(4) | payload            <-->   (length = payload + 4)
///   | 0x00000000 (heartbeat)         <-->
/// ```
pub struct StreamAdapter {
    options: StreamOptions,
    io: Arc<StreamIo>,
}

struct StreamIo {
    id: u64,
    writer: Mutex<Option<WriteHalf<BoxedIo>>>,
    handshake: OnceLock<Handshake>,
    heartbeat: OnceLock<Heartbeat>,
    closed_by_self: AtomicBool,
    cancel: CancellationToken,
}

impl StreamAdapter {
    pub fn new(options: StreamOptions) -> Self {
        Self {
            options,
            io: Arc::new(StreamIo {
                id: next_adapter_id(),
                writer: Mutex::new(None),
                handshake: OnceLock::new(),
                heartbeat: OnceLock::new(),
                closed_by_self: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.io.id
    }

    pub async fn connect(&self, events: EventSender) -> Result<Handshake> {
        let peer = self.options.connector.peer();
        let timeout = limit(self.options.connect_timeout);

        let opened = tokio::select! {
            _ = self.io.cancel.cancelled() => return Err(StreamError::closed_by_self()),
            opened = within(timeout, self.open()) => opened,
        };
        let (stream, handshake) = opened.map_err(|_| {
            StreamError::ConnectionTimeout(format!(
                "connect to {peer} timed out after {:?}",
                self.options.connect_timeout
            ))
        })??;

        if self.io.closed_by_self.load(Ordering::Acquire) {
            return Err(StreamError::closed_by_self());
        }

        let (reader, writer) = tokio::io::split(stream);
        *self.io.writer.lock().await = Some(writer);
        let _ = self.io.handshake.set(handshake.clone());

        info!(
            adapter = self.io.id,
            peer = %peer,
            connect_id = %handshake.connect_id,
            "stream connected"
        );
        debug!(adapter = self.io.id, handshake = %handshake, "negotiated");

        if let Some(interval) = limit(handshake.heartbeat_interval) {
            let beat_io = self.io.clone();
            let fail_io = self.io.clone();
            let fail_events = events.clone();
            let heartbeat = Heartbeat::spawn(
                interval,
                self.io.cancel.clone(),
                move || {
                    let io = beat_io.clone();
                    async move { io.write(LengthFrame::Heartbeat).await }
                },
                move |err| fail_io.report(&fail_events, err),
            );
            let _ = self.io.heartbeat.set(heartbeat);
        }

        tokio::spawn(read_loop(self.io.clone(), reader, events));
        Ok(handshake)
    }

    async fn open(&self) -> Result<(BoxedIo, Handshake)> {
        let mut stream = self
            .options
            .connector
            .connect()
            .await
            .map_err(|err| StreamError::from_transport("connect", err))?;

        stream
            .write_all(&handshake_request())
            .await
            .map_err(|err| StreamError::from_io("write handshake", err))?;
        stream
            .flush()
            .await
            .map_err(|err| StreamError::from_io("write handshake", err))?;

        let mut raw = [0u8; HANDSHAKE_LEN];
        stream
            .read_exact(&mut raw)
            .await
            .map_err(|err| StreamError::from_io("read handshake", err))?;
        let handshake =
            Handshake::parse(&raw).map_err(|err| StreamError::fatal_frame("handshake", err))?;

        Ok((stream, handshake))
    }

    pub async fn send(&self, payload: Bytes) -> Result<()> {
        let Some(handshake) = self.io.handshake.get() else {
            return Err(StreamError::connection("not connected"));
        };
        if payload.len() + LENGTH_PREFIX > handshake.max_bytes as usize {
            return Err(StreamError::generic(format!(
                "request size {} exceeds max bytes {}",
                payload.len(),
                (handshake.max_bytes as usize).saturating_sub(LENGTH_PREFIX)
            )));
        }

        let _pause = self.io.heartbeat.get().map(Heartbeat::pause);
        self.io.write(LengthFrame::Payload(payload)).await
    }

    pub async fn close(&self) {
        if self.io.closed_by_self.swap(true, Ordering::AcqRel) {
            return;
        }
        self.io.cancel.cancel();

        let writer = self.io.writer.lock().await.take();
        if let Some(mut writer) = writer {
            let _ = within(limit(self.options.connect_timeout), writer.shutdown()).await;
        }
        debug!(adapter = self.io.id, "stream closed");
    }

    pub fn abort(&self) {
        self.io.closed_by_self.store(true, Ordering::Release);
        self.io.cancel.cancel();
    }
}

impl Drop for StreamAdapter {
    fn drop(&mut self) {
        self.io.cancel.cancel();
    }
}

impl std::fmt::Debug for StreamAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamAdapter")
            .field("id", &self.io.id)
            .field("options", &self.options)
            .field("handshake", &self.io.handshake.get())
            .finish()
    }
}

impl StreamIo {
    /// Write one frame under the write lock, bounded by the frame timeout.
    async fn write(&self, frame: LengthFrame) -> Result<()> {
        let handshake = self
            .handshake
            .get()
            .ok_or_else(|| StreamError::connection("not connected"))?;

        let mut buf = BytesMut::new();
        LengthCodec::new(handshake.max_bytes)
            .encode(frame, &mut buf)
            .map_err(|err| StreamError::generic_with("encode frame", err))?;

        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(StreamError::connection("stream closed"));
        };

        let write = async {
            writer.write_all(&buf).await?;
            writer.flush().await
        };

        tokio::select! {
            _ = self.cancel.cancelled() => Err(StreamError::connection("stream closed")),
            result = within(handshake.frame_deadline(), write) => match result {
                Err(_) => Err(StreamError::ConnectionTimeout(format!(
                    "write timed out after {:?}",
                    handshake.frame_timeout
                ))),
                Ok(Err(err)) => Err(StreamError::from_io("write", err)),
                Ok(Ok(())) => {
                    trace!(adapter = self.id, len = buf.len(), "frame written");
                    Ok(())
                }
            },
        }
    }

    fn report(&self, events: &EventSender, err: StreamError) {
        if self.closed_by_self.load(Ordering::Acquire) {
            return;
        }
        debug!(adapter = self.id, error = %err, "stream failed");
        let _ = events.send(AdapterEvent::Error(err));
    }
}

async fn read_loop(io: Arc<StreamIo>, mut reader: ReadHalf<BoxedIo>, events: EventSender) {
    let Some(handshake) = io.handshake.get().cloned() else {
        return;
    };

    let result = tokio::select! {
        _ = io.cancel.cancelled() => return,
        result = read_frames(&mut reader, &events, &handshake) => result,
    };

    if let Err(err) = result {
        io.report(&events, err);
    }
}

/// Returns `Ok` only when nobody is listening for events any more.
async fn read_frames(
    reader: &mut ReadHalf<BoxedIo>,
    events: &EventSender,
    handshake: &Handshake,
) -> Result<()> {
    // The peer heartbeats at the same interval; two missed beats is a dead link.
    let idle = limit(handshake.heartbeat_interval * 2);

    loop {
        let mut prefix = [0u8; LENGTH_PREFIX];
        match within(idle, reader.read_exact(&mut prefix)).await {
            Err(_) => {
                return Err(StreamError::ConnectionTimeout(format!(
                    "no data from peer for {:?}",
                    handshake.heartbeat_interval * 2
                )))
            }
            Ok(Err(err)) => return Err(StreamError::from_io("read length", err)),
            Ok(Ok(_)) => {}
        }

        let length = u32::from_be_bytes(prefix);
        let Some(len) = payload_len(length, handshake.max_bytes).map_err(|err| match err {
            FrameError::FrameTooLarge { .. } => {
                StreamError::connection(format!("received too large frame: {err}"))
            }
            other => StreamError::fatal_frame("read length", other),
        })?
        else {
            trace!("heartbeat received");
            continue;
        };

        let mut payload = BytesMut::zeroed(len);
        match within(handshake.frame_deadline(), reader.read_exact(&mut payload)).await {
            Err(_) => {
                return Err(StreamError::ConnectionTimeout(format!(
                    "frame body not received within {:?}",
                    handshake.frame_timeout
                )))
            }
            Ok(Err(err)) => return Err(StreamError::from_io("read frame", err)),
            Ok(Ok(_)) => {}
        }

        if events
            .send(AdapterEvent::Message(payload.freeze()))
            .is_err()
        {
            return Ok(());
        }
    }
}
