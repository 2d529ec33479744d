//! Archive poll cycle and its interval loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use sipin_db::StateStore;
use sipin_mam::RecordSource;
use sipin_schemas::{MamRecord, POLLER_EVENT_TYPE};

use crate::query::MediaHavenQuery;
use crate::record::{Classification, RecordClassifier, RecordError};
use crate::shutdown::Shutdown;

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Counters for one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub started_at: Option<DateTime<Utc>>,
    /// Pids still `in_progress` at cycle start.
    pub pending_pids: usize,
    /// Records returned by the archive.
    pub fetched: usize,
    pub archived: usize,
    pub failed: usize,
    /// Records classified pending (no write).
    pub still_pending: usize,
    /// Per-record failures, caught and logged.
    pub errors: usize,
    /// Rows actually changed by the poller writes.
    pub rows_updated: u64,
    /// Set when the archive lookup itself failed; the cycle did nothing.
    pub query_error: Option<String>,
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// One poll cycle: pending pids -> bulk lookup -> classify -> guarded write.
#[derive(Clone)]
pub struct MamReconciler {
    store: Arc<dyn StateStore>,
    source: Arc<dyn RecordSource>,
    classifier: RecordClassifier,
}

impl MamReconciler {
    pub fn new(store: Arc<dyn StateStore>, source: Arc<dyn RecordSource>) -> Self {
        Self {
            store,
            source,
            classifier: RecordClassifier::new(),
        }
    }

    /// Run one cycle. `now` stands in for archive dates that are missing or
    /// unparseable.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport {
            started_at: Some(now),
            ..CycleReport::default()
        };

        let pids = self.store.select_pids_in_progress().await;
        report.pending_pids = pids.len();
        info!(pending = pids.len(), "poll cycle start");

        let query = match MediaHavenQuery::new().pids(&pids) {
            Ok(q) => q.build(),
            Err(_) => {
                debug!("no pending pids; nothing to poll");
                return report;
            }
        };

        let records = match self.source.search_all(&query).await {
            Ok(r) => r,
            Err(e) => {
                warn!(source = self.source.source_name(), error = %e, "archive lookup failed; skipping cycle");
                report.query_error = Some(e.to_string());
                return report;
            }
        };
        report.fetched = records.len();

        for raw in &records {
            match self.apply_record(raw, now).await {
                Ok((Classification::Archived { .. }, rows)) => {
                    report.archived += 1;
                    report.rows_updated += rows;
                }
                Ok((Classification::Failed { .. }, rows)) => {
                    report.failed += 1;
                    report.rows_updated += rows;
                }
                Ok((Classification::Pending, _)) => report.still_pending += 1,
                Err(e) => {
                    report.errors += 1;
                    warn!(filename = raw_filename(raw).unwrap_or("<unknown>"), error = %e, "failed to process archive record");
                }
            }
        }

        info!(
            archived = report.archived,
            failed = report.failed,
            pending = report.still_pending,
            errors = report.errors,
            rows = report.rows_updated,
            "poll cycle done"
        );
        report
    }

    async fn apply_record(
        &self,
        raw: &Value,
        now: DateTime<Utc>,
    ) -> Result<(Classification, u64), RecordError> {
        let record =
            MamRecord::from_value(raw).map_err(|e| RecordError::Undecodable(e.to_string()))?;
        let class = self.classifier.classify(&record, now)?;

        let rows = match &class {
            Classification::Archived { pid, at } => {
                let n = self.store.update_sip_mam_success(pid, *at).await?;
                debug!(pid = %pid, event_type = POLLER_EVENT_TYPE, rows = n, "archived");
                n
            }
            Classification::Failed { pid, at, message } => {
                let n = self.store.update_sip_mam_failure(pid, *at, message).await?;
                debug!(pid = %pid, event_type = POLLER_EVENT_TYPE, rows = n, "archive failure");
                n
            }
            Classification::Pending => 0,
        };
        Ok((class, rows))
    }
}

/// Best-effort filename for log lines, straight from the raw JSON.
fn raw_filename(raw: &Value) -> Option<&str> {
    raw.pointer("/Descriptive/OriginalFilename")
        .and_then(Value::as_str)
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

/// Run cycles every `interval` until `shutdown` fires. Cancellation is
/// observed before each cycle and during the wait; a running cycle is
/// finished. `on_report` receives every cycle's report. Returns the number
/// of cycles run.
pub async fn poll_loop<F>(
    reconciler: &MamReconciler,
    interval: Duration,
    mut shutdown: Shutdown,
    mut on_report: F,
) -> u64
where
    F: FnMut(CycleReport),
{
    let mut cycles = 0u64;
    info!(interval_secs = interval.as_secs(), "poller started");
    loop {
        if shutdown.is_triggered() {
            break;
        }
        let report = reconciler.run_cycle(Utc::now()).await;
        cycles += 1;
        on_report(report);
        if shutdown.sleep(interval).await {
            break;
        }
    }
    info!(cycles, "poller stopped");
    cycles
}
