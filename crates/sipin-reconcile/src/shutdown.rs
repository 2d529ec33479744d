//! Process-wide cancellation signal.
//!
//! A `watch<bool>` pair: one [`ShutdownTrigger`] owned by the process loop,
//! any number of cloned [`Shutdown`] observers (poll loop, listener, HTTP).
//! Dropping the trigger counts as shutdown.

use std::time::Duration;

use tokio::sync::watch;

pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Signal every observer. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is signalled (or the trigger is gone).
    pub async fn wait(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Bounded interruptible wait. Returns `true` if shutdown was signalled
    /// before `dur` elapsed.
    pub async fn sleep(&mut self, dur: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(dur) => self.is_triggered(),
            _ = self.wait() => true,
        }
    }
}
