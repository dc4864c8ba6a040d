//! Session lifetime and cancellation.
//!
//! A [`SessionHandle`] owns the session; every task working for it holds a
//! [`SessionCancel`]. Cancelling is idempotent, and dropping the handle ends the
//! session as well, so no tick loop can outlive its owner.

use std::time::Duration;

use tokio::sync::watch;

/// Owner side of a session. Call [`SessionHandle::cancel`] on logout or shutdown.
#[derive(Debug)]
pub struct SessionHandle {
    tx: watch::Sender<bool>,
}

/// Observer side of a session, checked by long-running work between steps.
#[derive(Debug, Clone)]
pub struct SessionCancel {
    rx: watch::Receiver<bool>,
}

/// Create a fresh, live session.
pub fn session() -> (SessionHandle, SessionCancel) {
    let (tx, rx) = watch::channel(false);
    (SessionHandle { tx }, SessionCancel { rx })
}

impl SessionHandle {
    /// End the session. Safe to call any number of times.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Another observer for the same session.
    pub fn token(&self) -> SessionCancel {
        SessionCancel {
            rx: self.tx.subscribe(),
        }
    }
}

impl SessionCancel {
    /// True once the session was cancelled or its handle dropped.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves when the session ends.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // An error means the handle is gone, which ends the session too.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Sleep for `duration` unless the session ends first.
    /// Returns `true` when the full duration elapsed.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}
