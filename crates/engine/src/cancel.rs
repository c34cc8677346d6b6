//! Per-submit cancellation tokens.
//!
//! Each settlement attempt gets its own handle/token pair; a
//! superseding submit cancels the previous handle, which aborts any
//! in-flight await tied to the token. There is no ambient, reused
//! abort state.

use tokio::sync::watch;

/// Create a linked cancellation pair
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

/// Owning side: cancelling is idempotent
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Observing side, cloned into the settlement task
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the paired handle cancels. If the handle is dropped
    /// without cancelling, this stays pending forever.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
