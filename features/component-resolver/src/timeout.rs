use std::{
    future::Future,
    pin::Pin,
    sync::mpsc::{self, RecvTimeoutError},
    task::{Context, Poll},
    thread,
    time::Duration,
};

use futures::{executor::block_on, FutureExt};
use futures_channel::oneshot;

/// The timer fired before the raced future settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed(pub Duration);

/// Completes with [Elapsed] once `duration` has passed
///
/// The timer runs on a helper thread so this works on any executor. Dropping the timer wakes the
/// helper thread which then exits right away.
pub struct Timer {
    duration: Duration,
    expired: oneshot::Receiver<()>,
    _cancel: mpsc::Sender<()>,
}

impl Timer {
    pub fn new(duration: Duration) -> Self {
        let (expired_tx, expired_rx) = oneshot::channel::<()>();
        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();

        // We don't join the thread - it dies once the timer fires or the timer is dropped
        thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(duration) {
                let _ = expired_tx.send(());
            }
        });

        Timer {
            duration,
            expired: expired_rx,
            _cancel: cancel_tx,
        }
    }
}

impl Future for Timer {
    type Output = Elapsed;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.expired.poll_unpin(cx) {
            Poll::Ready(Ok(())) => Poll::Ready(Elapsed(self.duration)),
            // The helper thread only drops the sender without firing if it panicked
            Poll::Ready(Err(oneshot::Canceled)) | Poll::Pending => Poll::Pending,
        }
    }
}

/// Keeps driving a future nobody waits on any more, discarding its output
///
/// Runs on its own helper thread until the future settles.
pub fn run_detached<F>(future: F)
where
    F: Future + Send + 'static,
{
    thread::spawn(move || {
        let _ = block_on(future);
    });
}
