use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use sipin_db::{StateStore, StoreError};
use sipin_schemas::{IngestRecord, SipStatus, POLLER_EVENT_TYPE};

/// In-memory [`StateStore`] used ONLY for tests.
///
/// Applies the same WHERE-clause guards as the Postgres statements, row by
/// row, under one lock per call. `set_unavailable(true)` makes every write
/// fail and the pending-list read degrade to empty.
#[derive(Default)]
pub struct InMemoryStateStore {
    rows: Mutex<Vec<IngestRecord>>,
    unavailable: AtomicBool,
}

fn newer(stored: Option<DateTime<Utc>>, ts: DateTime<Utc>) -> bool {
    match stored {
        None => true,
        Some(s) => s < ts,
    }
}

/// The poller's timestamp is kept unless the stored one is strictly newer.
fn poller_wins(stored: Option<DateTime<Utc>>, ts: DateTime<Utc>) -> bool {
    match stored {
        None => true,
        Some(s) => s <= ts,
    }
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: impl IntoIterator<Item = IngestRecord>) -> Self {
        let s = Self::new();
        for r in rows {
            s.insert(r);
        }
        s
    }

    /// Insert a row as the upstream creator would. Replaces an existing row
    /// with the same correlation id.
    pub fn insert(&self, rec: IngestRecord) {
        let mut rows = self.lock();
        rows.retain(|r| r.correlation_id != rec.correlation_id);
        rows.push(rec);
    }

    pub fn get(&self, correlation_id: &str) -> Option<IngestRecord> {
        self.lock()
            .iter()
            .find(|r| r.correlation_id == correlation_id)
            .cloned()
    }

    pub fn rows(&self) -> Vec<IngestRecord> {
        self.lock().clone()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<IngestRecord>> {
        // A panicking test thread must not hide the rows from the others.
        self.rows.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn check(&self, op: &'static str) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::new(op, "store unavailable"));
        }
        Ok(())
    }

    fn update_where<P, U>(&self, op: &'static str, pred: P, mut apply: U) -> Result<u64, StoreError>
    where
        P: Fn(&IngestRecord) -> bool,
        U: FnMut(&mut IngestRecord),
    {
        self.check(op)?;
        let mut n = 0;
        for r in self.lock().iter_mut().filter(|r| pred(r)) {
            apply(r);
            n += 1;
        }
        Ok(n)
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn update_sip_ingest_failed(
        &self,
        correlation_id: &str,
        event_type: &str,
        event_timestamp: DateTime<Utc>,
        failure_message: &str,
    ) -> Result<u64, StoreError> {
        self.update_where(
            "update_sip_ingest_failed",
            |r| r.correlation_id == correlation_id && newer(r.last_event_occurred_at, event_timestamp),
            |r| {
                r.status = SipStatus::Failure;
                r.failure_message = Some(failure_message.to_string());
                r.last_event_type = Some(event_type.to_string());
                r.last_event_occurred_at = Some(event_timestamp);
            },
        )
    }

    async fn update_sip_ingest(
        &self,
        correlation_id: &str,
        event_type: &str,
        event_timestamp: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.update_where(
            "update_sip_ingest",
            |r| r.correlation_id == correlation_id && newer(r.last_event_occurred_at, event_timestamp),
            |r| {
                r.last_event_type = Some(event_type.to_string());
                r.last_event_occurred_at = Some(event_timestamp);
            },
        )
    }

    async fn update_sip_ingest_pid(
        &self,
        correlation_id: &str,
        pid: &str,
    ) -> Result<u64, StoreError> {
        self.update_where(
            "update_sip_ingest_pid",
            |r| r.correlation_id == correlation_id && r.pid.is_none(),
            |r| r.pid = Some(pid.to_string()),
        )
    }

    async fn select_pids_in_progress(&self) -> Vec<String> {
        if self.check("select_pids_in_progress").is_err() {
            return Vec::new();
        }
        let mut pids: Vec<String> = self
            .lock()
            .iter()
            .filter(|r| r.status == SipStatus::InProgress)
            .filter_map(|r| r.pid.clone())
            .collect();
        pids.sort();
        pids.dedup();
        pids
    }

    async fn update_sip_mam_success(
        &self,
        pid: &str,
        event_timestamp: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.update_where(
            "update_sip_mam_success",
            |r| r.pid.as_deref() == Some(pid) && r.status == SipStatus::InProgress,
            |r| {
                r.status = SipStatus::Success;
                if poller_wins(r.last_event_occurred_at, event_timestamp) {
                    r.last_event_type = Some(POLLER_EVENT_TYPE.to_string());
                    r.last_event_occurred_at = Some(event_timestamp);
                }
            },
        )
    }

    async fn update_sip_mam_failure(
        &self,
        pid: &str,
        event_timestamp: DateTime<Utc>,
        failure_message: &str,
    ) -> Result<u64, StoreError> {
        self.update_where(
            "update_sip_mam_failure",
            |r| r.pid.as_deref() == Some(pid) && r.status == SipStatus::InProgress,
            |r| {
                r.status = SipStatus::Failure;
                r.failure_message = Some(failure_message.to_string());
                if poller_wins(r.last_event_occurred_at, event_timestamp) {
                    r.last_event_type = Some(POLLER_EVENT_TYPE.to_string());
                    r.last_event_occurred_at = Some(event_timestamp);
                }
            },
        )
    }
}
