use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use sipin_reconcile::{Delivery, EventSubscription};

/// Acks and nacks seen by a [`ChannelSubscription`], in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionLog {
    pub acked: Vec<String>,
    pub nacked: Vec<String>,
}

/// Event subscription double used ONLY for tests.
///
/// Deliveries are pushed through a [`SubscriptionHandle`]; dropping every
/// handle closes the subscription once the queue drains.
pub struct ChannelSubscription {
    rx: mpsc::UnboundedReceiver<Delivery>,
    log: Arc<Mutex<SubscriptionLog>>,
}

#[derive(Clone)]
pub struct SubscriptionHandle {
    tx: mpsc::UnboundedSender<Delivery>,
    log: Arc<Mutex<SubscriptionLog>>,
    next_id: Arc<Mutex<u64>>,
}

impl ChannelSubscription {
    pub fn channel() -> (Self, SubscriptionHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let log = Arc::new(Mutex::new(SubscriptionLog::default()));
        (
            Self {
                rx,
                log: log.clone(),
            },
            SubscriptionHandle {
                tx,
                log,
                next_id: Arc::new(Mutex::new(0)),
            },
        )
    }

    fn log(&self) -> std::sync::MutexGuard<'_, SubscriptionLog> {
        self.log.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl SubscriptionHandle {
    /// Queue a raw body; returns the delivery id assigned to it.
    pub fn push_body(&self, body: impl Into<Vec<u8>>) -> String {
        let id = {
            let mut n = self.next_id.lock().unwrap_or_else(|p| p.into_inner());
            *n += 1;
            format!("msg-{}", *n)
        };
        // Receiver gone means the listener already stopped; nothing to do.
        let _ = self.tx.send(Delivery {
            id: id.clone(),
            topic: Some("public/sipin/sip-2.validate".to_string()),
            body: body.into(),
        });
        id
    }

    pub fn push_json(&self, event: &serde_json::Value) -> String {
        self.push_body(event.to_string())
    }

    pub fn log(&self) -> SubscriptionLog {
        self.log.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Read-only view of the log that does not keep the subscription open.
    pub fn view(&self) -> SubscriptionView {
        SubscriptionView {
            log: self.log.clone(),
        }
    }
}

#[derive(Clone)]
pub struct SubscriptionView {
    log: Arc<Mutex<SubscriptionLog>>,
}

impl SubscriptionView {
    pub fn log(&self) -> SubscriptionLog {
        self.log.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl EventSubscription for ChannelSubscription {
    async fn next(&mut self) -> Result<Option<Delivery>> {
        Ok(self.rx.recv().await)
    }

    async fn ack(&mut self, delivery_id: &str) -> Result<()> {
        self.log().acked.push(delivery_id.to_string());
        Ok(())
    }

    async fn nack(&mut self, delivery_id: &str) -> Result<()> {
        self.log().nacked.push(delivery_id.to_string());
        Ok(())
    }
}
