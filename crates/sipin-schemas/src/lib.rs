//! sipin-schemas
//!
//! Shared row and wire types for the SIP ingest state updater.
//!
//! - [`IngestRecord`] / [`SipStatus`]: one persisted row per package.
//! - [`PipelineEvent`]: one lifecycle event from an upstream pipeline stage.
//! - [`MamRecord`]: one record returned by the archive system (MediaHaven).
//!
//! No IO. Parsing is total: missing optional fields become `None`, missing
//! required event fields become [`MalformedEvent`].

mod event;
mod mam;

pub use event::{EventData, EventOutcome, MalformedEvent, PipelineEvent};
pub use mam::{
    AdministrativeSection, DescriptiveSection, InternalSection, MamRecord, RecordRejections,
    Rejection,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Failure message stored when a failing pipeline event carries no message.
pub const DEFAULT_SIP_FAILURE_MESSAGE: &str = "SIP ingest failed";

/// Failure message stored when a rejected archive record carries no motivation.
pub const DEFAULT_MAM_FAILURE_MESSAGE: &str = "MediaHaven ingest failed";

/// `last_event_type` written by the archive poller for both terminal outcomes.
pub const POLLER_EVENT_TYPE: &str = "mediahaven.sip.archived";

/// Ingest status of one SIP.
///
/// `InProgress` is the only non-terminal state. Nothing in this workspace
/// ever writes `InProgress` back onto a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SipStatus {
    InProgress,
    Success,
    Failure,
}

impl SipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SipStatus::InProgress => "in_progress",
            SipStatus::Success => "success",
            SipStatus::Failure => "failure",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(SipStatus::InProgress),
            "success" => Some(SipStatus::Success),
            "failure" => Some(SipStatus::Failure),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SipStatus::InProgress)
    }
}

impl std::fmt::Display for SipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted ingest row.
///
/// Rows are created upstream; this workspace only mutates them through the
/// guarded store operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestRecord {
    pub correlation_id: String,
    /// Write-once; `None` until the archive system assigns one.
    pub pid: Option<String>,
    pub status: SipStatus,
    pub last_event_type: Option<String>,
    /// Monotonic per row. `None` sorts before every timestamp.
    pub last_event_occurred_at: Option<DateTime<Utc>>,
    pub failure_message: Option<String>,
}

impl IngestRecord {
    /// A fresh in-progress row, the shape the upstream creator inserts.
    pub fn in_progress(
        correlation_id: impl Into<String>,
        last_event_type: impl Into<String>,
        last_event_occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            pid: None,
            status: SipStatus::InProgress,
            last_event_type: Some(last_event_type.into()),
            last_event_occurred_at: Some(last_event_occurred_at),
            failure_message: None,
        }
    }

    pub fn with_pid(mut self, pid: impl Into<String>) -> Self {
        self.pid = Some(pid.into());
        self
    }
}
