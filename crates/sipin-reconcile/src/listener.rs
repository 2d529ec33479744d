//! Event-driven context: pull deliveries from a subscription one at a time,
//! apply each, then ack or nack it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info};

use crate::event::{EventDecision, EventHandler, HandleError};
use crate::shutdown::Shutdown;

/// Pipeline topics the SIP ingest updater consumes.
pub const CONSUMER_TOPICS: &[&str] = &[
    // 1.x
    "public/sipin/sip.loadgraph",
    "public/sipin/bag.transfer",
    "public/sipin/bag.unzip",
    "public/sipin/mh-sip.create",
    "public/sipin/sip.validate.xsd",
    "public/sipin/sip.validate.shacl",
    "public/sipin/bag.validate",
    "public/sipin/mh-sip.transfer",
    // 2.x
    "public/sipin/sip-2.unzip",
    "public/sipin/sip-2.validate",
    "public/sipin/sip-2.transform",
    "public/sipin/sip-2.mh-sip.create",
];

/// One message handed out by a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Transport-level id used to ack/nack.
    pub id: String,
    pub topic: Option<String>,
    /// Raw JSON event body.
    pub body: Vec<u8>,
}

/// Message-bus seam. Redelivery after `nack` is the transport's job.
#[async_trait]
pub trait EventSubscription: Send {
    /// Next delivery, or `None` once the subscription is closed.
    async fn next(&mut self) -> Result<Option<Delivery>>;
    async fn ack(&mut self, delivery_id: &str) -> Result<()>;
    async fn nack(&mut self, delivery_id: &str) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListenerStats {
    pub received: u64,
    pub acked: u64,
    pub nacked: u64,
    pub malformed: u64,
    pub store_errors: u64,
    /// Ack or nack calls the transport refused. The delivery stays with the
    /// transport for redelivery.
    pub settle_errors: u64,
}

impl ListenerStats {
    pub fn record(&mut self, outcome: &Result<EventDecision, HandleError>) {
        self.received += 1;
        match outcome {
            Ok(_) => self.acked += 1,
            Err(HandleError::Malformed(_)) => {
                self.nacked += 1;
                self.malformed += 1;
            }
            Err(HandleError::Store(_)) => {
                self.nacked += 1;
                self.store_errors += 1;
            }
        }
    }

    /// Move an already recorded outcome out of `acked`/`nacked` after the
    /// transport refused to settle it.
    pub fn record_settle_error(&mut self, outcome: &Result<EventDecision, HandleError>) {
        match outcome {
            Ok(_) => self.acked = self.acked.saturating_sub(1),
            Err(_) => self.nacked = self.nacked.saturating_sub(1),
        }
        self.settle_errors += 1;
    }
}

/// Consume `sub` until it closes or `shutdown` fires.
///
/// Shutdown is only observed while waiting for the next delivery; once a
/// delivery has been taken it is handled and acked/nacked before the loop
/// looks at the signal again. `on_outcome` sees every handled delivery.
///
/// A failed ack or nack is logged and counted; the delivery is left to the
/// transport's redelivery. Only a receive failure ends the listener.
pub async fn run_listener<S, F>(
    handler: &EventHandler,
    sub: &mut S,
    mut shutdown: Shutdown,
    mut on_outcome: F,
) -> Result<ListenerStats>
where
    S: EventSubscription + ?Sized,
    F: FnMut(&Result<EventDecision, HandleError>),
{
    let mut stats = ListenerStats::default();
    info!(topics = CONSUMER_TOPICS.len(), "listener started");

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            next = sub.next() => next.context("subscription receive failed")?,
        };
        let Some(delivery) = next else {
            info!("subscription closed");
            break;
        };

        let outcome = handler.handle_slice(&delivery.body).await;
        let settled = match &outcome {
            Ok(_) => sub.ack(&delivery.id).await,
            Err(e) => {
                error!(delivery_id = %delivery.id, topic = ?delivery.topic, error = %e, "event handling failed; nacking");
                sub.nack(&delivery.id).await
            }
        };
        stats.record(&outcome);
        if let Err(e) = settled {
            error!(delivery_id = %delivery.id, error = %e, "could not settle delivery; leaving it to redelivery");
            stats.record_settle_error(&outcome);
        }
        on_outcome(&outcome);
    }

    info!(
        received = stats.received,
        acked = stats.acked,
        nacked = stats.nacked,
        settle_errors = stats.settle_errors,
        "listener stopped"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_are_unique_and_namespaced() {
        let mut t = CONSUMER_TOPICS.to_vec();
        t.sort();
        t.dedup();
        assert_eq!(t.len(), CONSUMER_TOPICS.len());
        assert!(CONSUMER_TOPICS.iter().all(|t| t.starts_with("public/sipin/")));
    }

    #[test]
    fn stats_split_nacks_by_cause() {
        use sipin_db::StoreError;
        use sipin_schemas::PipelineEvent;

        let mut s = ListenerStats::default();
        let malformed = PipelineEvent::from_slice(b"{}").unwrap_err();
        s.record(&Err(HandleError::Malformed(malformed)));
        s.record(&Err(HandleError::Store(StoreError::new("x", "down"))));
        assert_eq!(s.received, 2);
        assert_eq!(s.nacked, 2);
        assert_eq!(s.malformed, 1);
        assert_eq!(s.store_errors, 1);
        assert_eq!(s.acked, 0);
    }

    #[test]
    fn settle_error_moves_count_out_of_acked() {
        use sipin_db::StoreError;

        let mut s = ListenerStats::default();
        let ok = Ok(EventDecision {
            event_id: "e1".into(),
            correlation_id: "c1".into(),
            verdict: crate::event::EventVerdict::Success,
            pid_rows: None,
            rows: 1,
        });
        s.record(&ok);
        s.record_settle_error(&ok);
        let err = Err(HandleError::Store(StoreError::new("x", "down")));
        s.record(&err);
        s.record_settle_error(&err);

        assert_eq!(s.received, 2);
        assert_eq!(s.acked, 0);
        assert_eq!(s.nacked, 0);
        assert_eq!(s.store_errors, 1);
        assert_eq!(s.settle_errors, 2);
    }
}
