use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{Result, StreamError};

#[derive(Debug, Clone, Copy)]
enum Signal {
    Stop,
    Restart,
}

/// Handle to the heartbeat task of one stream connection.
///
/// The task writes a heartbeat whenever a full interval passes with no
/// writer active. Every signal restarts the interval, so the next heartbeat
/// is due one interval after the last write finished.
#[derive(Debug)]
pub(crate) struct Heartbeat {
    control: mpsc::UnboundedSender<Signal>,
}

impl Heartbeat {
    /// Start the task. `beat` writes one heartbeat; if it fails, `on_failure`
    /// gets the error and the task ends. The task also ends on `cancel`.
    pub(crate) fn spawn<B, Fut, F>(
        interval: Duration,
        cancel: CancellationToken,
        beat: B,
        on_failure: F,
    ) -> Self
    where
        B: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
        F: FnOnce(StreamError) + Send + 'static,
    {
        let (control, signals) = mpsc::unbounded_channel();
        tokio::spawn(run(interval, cancel, signals, beat, on_failure));
        Self { control }
    }

    /// Suspend heartbeats until the returned guard is dropped.
    pub(crate) fn pause(&self) -> PauseGuard<'_> {
        let _ = self.control.send(Signal::Stop);
        PauseGuard {
            control: &self.control,
        }
    }
}

/// Restarts the heartbeat interval when dropped.
pub(crate) struct PauseGuard<'a> {
    control: &'a mpsc::UnboundedSender<Signal>,
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        let _ = self.control.send(Signal::Restart);
    }
}

async fn run<B, Fut, F>(
    interval: Duration,
    cancel: CancellationToken,
    mut signals: mpsc::UnboundedReceiver<Signal>,
    mut beat: B,
    on_failure: F,
) where
    B: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
    F: FnOnce(StreamError),
{
    let mut writers = 0usize;

    let err = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            signal = signals.recv() => match signal {
                Some(Signal::Stop) => writers += 1,
                Some(Signal::Restart) => writers = writers.saturating_sub(1),
                None => return,
            },
            _ = tokio::time::sleep(interval), if writers == 0 => {
                trace!("heartbeat");
                if let Err(err) = beat().await {
                    break err;
                }
            }
        }
    };

    if !cancel.is_cancelled() {
        on_failure(err);
    }
}
