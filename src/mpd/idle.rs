//! Idle/noidle coordination
//!
//! While idling, the read half of the socket belongs to a listener task that
//! blocks until the server answers `idle`. The listener hands the reader back
//! through a oneshot channel once it has drained the answer, so the command
//! path cannot touch the socket before that response is consumed.

use serde::Serialize;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{oneshot, watch};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::error::{MpdError, MpdResult};
use super::responses::{self, Terminal};

/// Where the connection stands in the idle handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IdleState {
    NotIdling,
    /// `idle` is being written
    EnteringIdle,
    /// Listener is blocked on the server
    Idling,
    /// `noidle` written, waiting for the listener to drain the answer
    LeavingIdle,
}

/// What the listener hands back when the server ends an idle
#[derive(Debug)]
pub(crate) struct IdleWake<R> {
    pub reader: R,
    pub changed: Vec<String>,
}

impl<R> IdleWake<R> {
    /// The server reported changes, so the wake was not only our `noidle`
    pub fn is_external(&self) -> bool {
        !self.changed.is_empty()
    }
}

/// Receiving end of the listener's single-use handoff
pub(crate) type Handoff<R> = oneshot::Receiver<MpdResult<IdleWake<R>>>;

/// Idle state, the delayed idle-entry timer and the running listener
pub struct IdleCoordinator {
    state: watch::Sender<IdleState>,
    timer: Mutex<Option<CancellationToken>>,
    listener: Mutex<Option<CancellationToken>>,
    delay: Duration,
}

impl IdleCoordinator {
    pub fn new(delay: Duration) -> Self {
        let (state, _) = watch::channel(IdleState::NotIdling);
        Self {
            state,
            timer: Mutex::new(None),
            listener: Mutex::new(None),
            delay,
        }
    }

    pub fn state(&self) -> IdleState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<IdleState> {
        self.state.subscribe()
    }

    pub(crate) fn set_state(&self, next: IdleState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            tracing::trace!("Idle state {:?} -> {:?}", prev, next);
        }
    }

    /// Run `fire` after the quiescence delay unless cancelled first. Any
    /// previously armed timer is cancelled.
    pub(crate) fn schedule<F, Fut>(&self, fire: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        if let Some(previous) = self.lock_timer().replace(token.clone()) {
            previous.cancel();
        }

        let delay = self.delay;
        let fired = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => fire(fired).await,
            }
        });
    }

    pub(crate) fn cancel_timer(&self) {
        if let Some(token) = self.lock_timer().take() {
            token.cancel();
        }
    }

    fn lock_timer(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.timer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Remember the cancellation handle of the listener now holding the reader
    pub(crate) fn set_listener(&self, cancel: CancellationToken) {
        let mut slot = self.listener.lock().unwrap_or_else(|p| p.into_inner());
        *slot = Some(cancel);
    }

    /// Stop the current listener, if any. Its handoff resolves with an error.
    pub(crate) fn abort_listener(&self) {
        let mut slot = self.listener.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(cancel) = slot.take() {
            cancel.cancel();
        }
    }
}

/// Block until the server answers `idle`, then drain the answer up to its
/// terminal line. The first read waits indefinitely; the rest are bounded by
/// `drain_timeout`.
pub(crate) async fn listen<R>(
    mut reader: R,
    cancel: &CancellationToken,
    drain_timeout: Duration,
) -> MpdResult<IdleWake<R>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let read = tokio::select! {
        _ = cancel.cancelled() => return Err(MpdError::Closed),
        read = reader.read_line(&mut line) => read?,
    };
    if read == 0 {
        return Err(MpdError::Closed);
    }

    let mut changed = Vec::new();
    loop {
        let current = line.trim_end();
        match responses::terminal(current) {
            Some(Terminal::Ok) => break,
            Some(Terminal::Ack(ack)) => {
                tracing::warn!("MPD rejected idle: {}", ack);
                break;
            }
            None => {
                if let Some(subsystem) = current.strip_prefix(responses::CHANGED) {
                    changed.push(subsystem.trim().to_string());
                }
            }
        }

        line.clear();
        let read = timeout(drain_timeout, reader.read_line(&mut line))
            .await
            .map_err(|_| MpdError::Timeout)??;
        if read == 0 {
            return Err(MpdError::Closed);
        }
    }

    Ok(IdleWake { reader, changed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncWriteExt, BufReader};
    use tokio_test::io::Builder;

    const DRAIN: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_listen_collects_changed_subsystems() {
        let mock = Builder::new()
            .read(b"changed: playlist\n")
            .read(b"changed: player\nOK\n")
            .build();
        let cancel = CancellationToken::new();

        let wake = listen(BufReader::new(mock), &cancel, DRAIN).await.unwrap();
        assert_eq!(wake.changed, ["playlist", "player"]);
        assert!(wake.is_external());
    }

    #[tokio::test]
    async fn test_listen_plain_ok_after_noidle() {
        let mock = Builder::new().read(b"OK\n").build();
        let cancel = CancellationToken::new();

        let wake = listen(BufReader::new(mock), &cancel, DRAIN).await.unwrap();
        assert!(wake.changed.is_empty());
        assert!(!wake.is_external());
    }

    #[tokio::test]
    async fn test_listen_eof_is_closed() {
        let mock = Builder::new().build();
        let cancel = CancellationToken::new();

        let err = listen(BufReader::new(mock), &cancel, DRAIN).await.unwrap_err();
        assert!(matches!(err, MpdError::Closed));
    }

    #[tokio::test]
    async fn test_listen_cancelled_while_blocked() {
        let (client, _server) = tokio::io::duplex(64);
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = listen(BufReader::new(client), &cancel, DRAIN).await.unwrap_err();
        assert!(matches!(err, MpdError::Closed));
    }

    #[tokio::test]
    async fn test_listen_times_out_on_unterminated_answer() {
        let (client, mut server) = tokio::io::duplex(64);
        server.write_all(b"changed: mixer\n").await.unwrap();
        let cancel = CancellationToken::new();

        let err = listen(BufReader::new(client), &cancel, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, MpdError::Timeout));
    }

    #[tokio::test]
    async fn test_schedule_fires_after_delay() {
        let idle = IdleCoordinator::new(Duration::from_millis(20));
        let (tx, rx) = oneshot::channel();
        idle.schedule(move |_| async move {
            let _ = tx.send(());
        });

        tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .expect("timer should fire")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_timer_never_fires() {
        let idle = IdleCoordinator::new(Duration::from_millis(30));
        let fired = Arc::new(AtomicBool::new(false));

        let first = fired.clone();
        idle.schedule(move |_| async move {
            first.store(true, Ordering::SeqCst);
        });
        idle.cancel_timer();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_state_watch() {
        let idle = IdleCoordinator::new(Duration::from_millis(10));
        let mut rx = idle.subscribe();
        idle.set_state(IdleState::Idling);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), IdleState::Idling);
        assert_eq!(idle.state(), IdleState::Idling);
    }
}
