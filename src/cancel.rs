use std::time::Duration;
use tokio::sync::watch;

/// Longest stretch a blocking pause runs without looking at the signal
const BLOCKING_SLICE: Duration = Duration::from_millis(20);

/// The duel was asked to stop while it was waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("duel cancelled")]
pub struct Cancelled;

/// Requests cancellation of a running duel
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Observes cancellation. Every wait of the duel loop goes through this.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl CancelSignal {
    /// A signal that is never raised
    pub fn never() -> Self {
        cancel_pair().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once cancellation is requested. Never resolves if the handle is gone.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Sleep for `duration`, returning early with `Cancelled` if cancellation is requested
    pub async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Blocking counterpart of `sleep` for synchronous callers such as input pacing
    pub fn block_for(&self, duration: Duration) -> Result<(), Cancelled> {
        let deadline = std::time::Instant::now() + duration;
        loop {
            self.check()?;
            let left = deadline.saturating_duration_since(std::time::Instant::now());
            if left.is_zero() {
                return Ok(());
            }
            std::thread::sleep(left.min(BLOCKING_SLICE));
        }
    }
}
