use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use muxstream_frame::{encode_push_ack, encode_request, Handshake, Response, Status};
use tokio::sync::{mpsc, oneshot, Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::adapter::{Adapter, AdapterEvent, EventReceiver};
use crate::callbacks::Callbacks;
use crate::error::{Result, StreamError};

/// First request id handed out; 0..=9 are reserved and 1 carries pushes.
pub const REQ_ID_START: u32 = 10;

#[derive(Debug)]
enum State {
    NotConnected,
    Connected,
    Invalidated(StreamError),
}

/// A request waiting for its response. Holding it keeps one concurrency
/// permit taken.
struct PendingRequest {
    slot: oneshot::Sender<Result<Response>>,
    _permit: OwnedSemaphorePermit,
}

struct Shared {
    state: State,
    handshake: Option<Handshake>,
    pending: HashMap<u32, PendingRequest>,
    next_req_id: u32,
    permits: Option<Arc<Semaphore>>,
}

impl Shared {
    fn alloc_req_id(&mut self) -> u32 {
        let id = self.next_req_id;
        self.next_req_id = match self.next_req_id.checked_add(1) {
            Some(next) => next,
            None => REQ_ID_START,
        };
        id
    }
}

struct Inner {
    id: u64,
    adapter: Adapter,
    shared: Mutex<Shared>,
    /// Serializes handshakes; held only by `connect`.
    connecting: Mutex<()>,
    invalidated: AtomicBool,
    callbacks: Arc<Callbacks>,
}

/// One logical connection: its adapter, handshake, state machine and the
/// table of in-flight requests.
///
/// ```text
/// NotConnected ──connect ok──▶ Connected ──error / close──▶ Invalidated
///       └─────────connect failed / close──────────────────────▲
/// ```
///
/// Invalidated is terminal. Recovering means building a new `Connection`.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    pub fn new(adapter: Adapter, callbacks: Arc<Callbacks>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: adapter.id(),
                adapter,
                shared: Mutex::new(Shared {
                    state: State::NotConnected,
                    handshake: None,
                    pending: HashMap::new(),
                    next_req_id: REQ_ID_START,
                    permits: None,
                }),
                connecting: Mutex::new(()),
                invalidated: AtomicBool::new(false),
                callbacks,
            }),
        }
    }

    /// Connect if not yet connected.
    ///
    /// Concurrent callers wait for the one handshake in progress. Once the
    /// connection is invalidated every call returns the stored error. The
    /// state lock is not held during the handshake, so `close` can cut it
    /// short.
    pub async fn connect(&self) -> Result<()> {
        let _gate = self.inner.connecting.lock().await;
        if let Some(done) = self.connect_outcome().await {
            return done;
        }

        let (events, receiver) = mpsc::unbounded_channel();
        let result = self.inner.adapter.connect(events).await;

        let mut shared = self.inner.shared.lock().await;
        if let State::Invalidated(err) = &shared.state {
            // Closed while the handshake was running.
            let err = err.clone();
            drop(shared);
            self.inner.adapter.close().await;
            return Err(err);
        }

        match result {
            Ok(handshake) => {
                let max_concurrent = usize::from(handshake.max_concurrent.max(1));
                info!(
                    connection = self.inner.id,
                    connect_id = %handshake.connect_id,
                    max_concurrent,
                    max_bytes = handshake.max_bytes,
                    "connection established"
                );
                shared.permits = Some(Arc::new(Semaphore::new(max_concurrent)));
                shared.handshake = Some(handshake);
                shared.state = State::Connected;
                tokio::spawn(dispatch(Arc::downgrade(&self.inner), receiver));
                Ok(())
            }
            Err(err) => {
                debug!(connection = self.inner.id, error = %err, "connect failed");
                shared.state = State::Invalidated(err.clone());
                self.inner.invalidated.store(true, Ordering::Release);
                Err(err)
            }
        }
    }

    /// `Some` once connect has nothing left to do.
    async fn connect_outcome(&self) -> Option<Result<()>> {
        match &self.inner.shared.lock().await.state {
            State::Connected => Some(Ok(())),
            State::Invalidated(err) => Some(Err(err.clone())),
            State::NotConnected => None,
        }
    }

    /// Send one request and wait up to `timeout` for its response.
    ///
    /// A timeout leaves the request registered: its concurrency permit stays
    /// taken until a late response arrives or the connection is invalidated.
    pub async fn send<I, K, V>(&self, body: &[u8], headers: I, timeout: Duration) -> Result<Bytes>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let (req_id, frame, permits) = {
            let mut shared = self.inner.shared.lock().await;
            match &shared.state {
                State::Invalidated(err) => return Err(err.clone()),
                State::NotConnected => return Err(StreamError::connection("not connected")),
                State::Connected => {}
            }

            let req_id = shared.alloc_req_id();
            let mut buf = BytesMut::new();
            encode_request(req_id, headers, body, &mut buf)
                .map_err(|err| StreamError::generic_with("encode request failed", err))?;

            let max_bytes = shared.handshake.as_ref().map_or(0, |hs| hs.max_bytes as usize);
            if buf.len() > max_bytes {
                return Err(StreamError::generic(format!(
                    "request size {} exceeds max bytes {max_bytes}",
                    buf.len()
                )));
            }
            (req_id, buf.freeze(), shared.permits.clone())
        };

        let Some(permits) = permits else {
            return Err(StreamError::connection("not connected"));
        };
        let permit = match permits.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return Err(self.stored_error().await.unwrap_or_else(StreamError::canceled)),
        };

        let (slot, response) = oneshot::channel();
        {
            let mut shared = self.inner.shared.lock().await;
            if let State::Invalidated(err) = &shared.state {
                return Err(err.clone());
            }
            shared.pending.insert(
                req_id,
                PendingRequest {
                    slot,
                    _permit: permit,
                },
            );
        }
        debug!(connection = self.inner.id, req_id, len = frame.len(), "request queued");

        let conn = self.clone();
        tokio::spawn(async move {
            if let Err(err) = conn.inner.adapter.send(frame).await {
                conn.fail_request(req_id, err).await;
            }
        });

        match tokio::time::timeout(timeout, response).await {
            Err(_) => Err(StreamError::RequestTimeout(format!(
                "request {req_id} timed out after {timeout:?}"
            ))),
            Ok(Err(_)) => Err(self
                .stored_error()
                .await
                .unwrap_or_else(|| StreamError::connection("request abandoned"))),
            Ok(Ok(Err(err))) => Err(err),
            Ok(Ok(Ok(resp))) => match resp.status {
                Status::Ok => Ok(resp.body),
                Status::Failed => Err(StreamError::generic(
                    String::from_utf8_lossy(&resp.body).into_owned(),
                )),
            },
        }
    }

    /// Invalidate without notifying the peer-closed handler. Also aborts a
    /// handshake in progress.
    pub async fn close(&self) {
        self.invalidate(StreamError::closed_by_self()).await;
        self.inner.adapter.close().await;
    }

    /// Stop the adapter's background tasks without waiting. Used on drop.
    pub fn abort(&self) {
        self.inner.adapter.abort();
    }

    pub async fn handshake(&self) -> Option<Handshake> {
        let shared = self.inner.shared.lock().await;
        match shared.state {
            State::Connected => shared.handshake.clone(),
            _ => None,
        }
    }

    pub fn is_invalidated(&self) -> bool {
        self.inner.invalidated.load(Ordering::Acquire)
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    async fn stored_error(&self) -> Option<StreamError> {
        match &self.inner.shared.lock().await.state {
            State::Invalidated(err) => Some(err.clone()),
            _ => None,
        }
    }

    /// Move to Invalidated and fail every pending request. Returns whether
    /// the connection was live before.
    async fn invalidate(&self, reason: StreamError) -> bool {
        let mut shared = self.inner.shared.lock().await;
        let was_connected = match shared.state {
            State::Invalidated(_) => return false,
            State::Connected => true,
            State::NotConnected => false,
        };

        let drained = if reason.is_connection_error() {
            reason.clone()
        } else {
            StreamError::connection(reason.to_string())
        };
        shared.state = State::Invalidated(reason);
        self.inner.invalidated.store(true, Ordering::Release);

        let pending = shared.pending.len();
        for (_, request) in shared.pending.drain() {
            let _ = request.slot.send(Err(drained.clone()));
        }
        if let Some(permits) = &shared.permits {
            permits.close();
        }
        debug!(connection = self.inner.id, pending, "connection invalidated");
        was_connected
    }

    async fn on_error(&self, err: StreamError) {
        if !self.invalidate(err.clone()).await {
            return;
        }
        warn!(connection = self.inner.id, error = %err, "connection lost");
        self.inner.callbacks.peer_closed(err);
        self.inner.adapter.close().await;
    }

    async fn fail_request(&self, req_id: u32, err: StreamError) {
        if err.is_connection_error() {
            // Draining delivers the same error to this request too.
            self.on_error(err).await;
            return;
        }
        let pending = self.inner.shared.lock().await.pending.remove(&req_id);
        if let Some(request) = pending {
            let _ = request.slot.send(Err(err));
        }
    }

    async fn on_message(&self, raw: Bytes) {
        let resp = match Response::decode(raw) {
            Ok(resp) => resp,
            Err(err) => {
                self.on_error(StreamError::connection(format!("invalid response: {err}")))
                    .await;
                return;
            }
        };

        if resp.is_push() {
            let push_id = resp.push_id.unwrap_or_default();
            debug!(connection = self.inner.id, push_id, len = resp.body.len(), "push received");
            self.inner.callbacks.push(resp.body);

            let conn = self.clone();
            tokio::spawn(async move {
                let mut ack = BytesMut::new();
                encode_push_ack(push_id, &mut ack);
                if let Err(err) = conn.inner.adapter.send(ack.freeze()).await {
                    warn!(connection = conn.inner.id, push_id, error = %err, "push ack failed");
                    // A partly written ack leaves the stream mid-frame.
                    if err.is_connection_error() {
                        conn.on_error(err).await;
                    }
                }
            });
            return;
        }

        let pending = self.inner.shared.lock().await.pending.remove(&resp.req_id);
        match pending {
            Some(request) => {
                debug!(connection = self.inner.id, req_id = resp.req_id, "response received");
                let _ = request.slot.send(Ok(resp));
            }
            None => {
                debug!(
                    connection = self.inner.id,
                    req_id = resp.req_id,
                    "response for unknown request, ignored"
                );
            }
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("invalidated", &self.is_invalidated())
            .finish()
    }
}

/// Handles adapter events in order, one at a time.
async fn dispatch(inner: Weak<Inner>, mut events: EventReceiver) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let conn = Connection { inner };
        match event {
            AdapterEvent::Message(raw) => conn.on_message(raw).await,
            AdapterEvent::Error(err) => conn.on_error(err).await,
        }
    }
}
