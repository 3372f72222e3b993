//! Single-use start gate.

use tokio::sync::{oneshot, Mutex};

/// Opens exactly once. Waiting after it opened returns immediately.
pub(super) struct StartGate {
    opener: Mutex<Option<oneshot::Sender<()>>>,
    waiter: Mutex<Option<oneshot::Receiver<()>>>,
}

impl StartGate {
    pub(super) fn new() -> Self {
        let (opener, waiter) = oneshot::channel();
        Self {
            opener: Mutex::new(Some(opener)),
            waiter: Mutex::new(Some(waiter)),
        }
    }

    /// Open the gate. Returns true only for the call that opened it.
    pub(super) async fn open(&self) -> bool {
        match self.opener.lock().await.take() {
            Some(opener) => {
                let _ = opener.send(());
                true
            }
            None => false,
        }
    }

    pub(super) async fn wait(&self) {
        let mut waiter = self.waiter.lock().await;
        if let Some(rx) = waiter.as_mut() {
            let _ = rx.await;
            *waiter = None;
        }
    }
}
