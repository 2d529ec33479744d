//! Pipeline event path: classify one event, apply its store writes.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use sipin_db::{StateStore, StoreError};
use sipin_schemas::{EventOutcome, MalformedEvent, PipelineEvent, DEFAULT_SIP_FAILURE_MESSAGE};

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventVerdict {
    Success,
    Failure,
}

/// Success iff all hold:
/// - the event's own outcome is `success`;
/// - the payload `outcome`, when present, is not `fail`;
/// - the payload `is_valid`, when present, is not `false`.
pub fn classify_event(event: &PipelineEvent) -> EventVerdict {
    if !event.outcome.is_success() {
        return EventVerdict::Failure;
    }
    if event.data.outcome() == Some(EventOutcome::Fail) {
        return EventVerdict::Failure;
    }
    if event.data.is_valid == Some(false) {
        return EventVerdict::Failure;
    }
    EventVerdict::Success
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why an event could not be applied. Either variant means the transport
/// should negatively acknowledge and redeliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleError {
    Malformed(MalformedEvent),
    Store(StoreError),
}

impl std::fmt::Display for HandleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandleError::Malformed(e) => write!(f, "{e}"),
            HandleError::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for HandleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HandleError::Malformed(e) => Some(e),
            HandleError::Store(e) => Some(e),
        }
    }
}

impl From<MalformedEvent> for HandleError {
    fn from(e: MalformedEvent) -> Self {
        HandleError::Malformed(e)
    }
}

impl From<StoreError> for HandleError {
    fn from(e: StoreError) -> Self {
        HandleError::Store(e)
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// Outcome of applying one event. Row counts of 0 are guarded no-ops
/// (stale or duplicate delivery, pid already set).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventDecision {
    pub event_id: String,
    pub correlation_id: String,
    pub verdict: EventVerdict,
    /// Rows changed by pid assignment; `None` when no pid write was attempted.
    pub pid_rows: Option<u64>,
    /// Rows changed by the status/timestamp write.
    pub rows: u64,
}

/// Applies pipeline events to the store. No retries: a returned error is
/// the caller's signal to redeliver.
#[derive(Clone)]
pub struct EventHandler {
    store: Arc<dyn StateStore>,
}

impl EventHandler {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Parse a raw JSON body, then apply it.
    pub async fn handle_slice(&self, body: &[u8]) -> Result<EventDecision, HandleError> {
        let event = PipelineEvent::from_slice(body)?;
        self.handle(&event).await
    }

    pub async fn handle_value(&self, body: &Value) -> Result<EventDecision, HandleError> {
        let event = PipelineEvent::from_value(body)?;
        self.handle(&event).await
    }

    pub async fn handle(&self, event: &PipelineEvent) -> Result<EventDecision, HandleError> {
        debug!(event_id = %event.id, "start handling of event");

        let verdict = classify_event(event);
        let cid = event.correlation_id.as_str();

        if verdict == EventVerdict::Failure {
            let message = event.data.message().unwrap_or(DEFAULT_SIP_FAILURE_MESSAGE);
            let rows = self
                .store
                .update_sip_ingest_failed(cid, &event.event_type, event.time, message)
                .await?;
            info!(correlation_id = cid, event_type = %event.event_type, "ingest has failed");
            debug!(correlation_id = cid, rows, "rows updated");
            return Ok(EventDecision {
                event_id: event.id.clone(),
                correlation_id: cid.to_string(),
                verdict,
                pid_rows: None,
                rows,
            });
        }

        // pid first: a crash between the two writes leaves a row with a pid
        // and an older timestamp, which redelivery completes.
        let pid_rows = match event.data.pid() {
            Some(pid) => {
                let n = self.store.update_sip_ingest_pid(cid, pid).await?;
                info!(correlation_id = cid, pid, rows = n, "update pid");
                Some(n)
            }
            None => None,
        };

        let rows = self
            .store
            .update_sip_ingest(cid, &event.event_type, event.time)
            .await?;
        debug!(correlation_id = cid, rows, "rows updated");

        Ok(EventDecision {
            event_id: event.id.clone(),
            correlation_id: cid.to_string(),
            verdict,
            pid_rows,
            rows,
        })
    }
}
