use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;

use crate::error::StreamError;

/// Invoked with the body of every server push.
pub type PushHandler = Arc<dyn Fn(Bytes) + Send + Sync>;

/// Invoked once when an established connection fails.
pub type PeerClosedHandler = Arc<dyn Fn(StreamError) + Send + Sync>;

/// Callback slots shared by a client and every connection it creates.
///
/// Handlers can be replaced at any time; each invocation uses whatever
/// handler is installed at that moment.
#[derive(Default)]
pub struct Callbacks {
    push: RwLock<Option<PushHandler>>,
    peer_closed: RwLock<Option<PeerClosedHandler>>,
}

impl Callbacks {
    pub fn set_push(&self, handler: PushHandler) {
        *self.push.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    pub fn set_peer_closed(&self, handler: PeerClosedHandler) {
        *self
            .peer_closed
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    pub(crate) fn push(&self, body: Bytes) {
        // Clone out of the lock so a handler may replace itself.
        let handler = self
            .push
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(handler) = handler {
            handler(body);
        }
    }

    pub(crate) fn peer_closed(&self, err: StreamError) {
        let handler = self
            .peer_closed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(handler) = handler {
            handler(err);
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let installed = |set: bool| if set { "installed" } else { "none" };
        f.debug_struct("Callbacks")
            .field(
                "push",
                &installed(self.push.read().map(|h| h.is_some()).unwrap_or(false)),
            )
            .field(
                "peer_closed",
                &installed(self.peer_closed.read().map(|h| h.is_some()).unwrap_or(false)),
            )
            .finish()
    }
}
