//! Archive record classification: archived / failed / pending.
//!
//! Classification is an ordered list of total predicates evaluated first
//! match wins. A missing field never matches; nothing here panics or errors
//! on record shape except the pid derivation, which needs a filename.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use sipin_db::StoreError;
use sipin_schemas::{MamRecord, DEFAULT_MAM_FAILURE_MESSAGE};

const ARCHIVE_STATUS_COMPLETED: &str = "completed";
const ARCHIVE_STATUS_FAILED: &str = "failed";
const RECORD_STATUS_PUBLISHED: &str = "Published";

/// `Administrative.RecordStatus` values that mean the archive refused the SIP.
pub const REJECTION_FAMILY: &[&str] = &[
    "Rejected",
    "RejectedForCorrection",
    "ApprovedForDestruction",
    "Destructed",
];

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure processing one polled record. Caught by the cycle; never aborts
/// the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// Raw JSON did not decode into a record shape.
    Undecodable(String),
    /// Record matched a terminal rule but has no `OriginalFilename`.
    MissingFilename,
    Store(StoreError),
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordError::Undecodable(m) => write!(f, "undecodable archive record: {m}"),
            RecordError::MissingFilename => write!(f, "archive record has no OriginalFilename"),
            RecordError::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RecordError {}

impl From<StoreError> for RecordError {
    fn from(e: StoreError) -> Self {
        RecordError::Store(e)
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Archived {
        pid: String,
        at: DateTime<Utc>,
    },
    Failed {
        pid: String,
        at: DateTime<Utc>,
        message: String,
    },
    /// Not terminal yet; left for the next cycle.
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    Archived,
    Failed,
}

fn is_rejected(r: &MamRecord) -> bool {
    r.record_status()
        .map(|s| REJECTION_FAMILY.contains(&s))
        .unwrap_or(false)
}

/// `completed` + `Published`. A `completed` archive status also wins over a
/// contradicting rejection-family record status.
fn is_archived(r: &MamRecord) -> bool {
    r.archive_status() == Some(ARCHIVE_STATUS_COMPLETED)
        && (r.record_status() == Some(RECORD_STATUS_PUBLISHED) || is_rejected(r))
}

fn is_failed(r: &MamRecord) -> bool {
    r.archive_status() == Some(ARCHIVE_STATUS_FAILED) || is_rejected(r)
}

/// Priority order, first match wins.
const RULES: &[(Rule, fn(&MamRecord) -> bool)] =
    &[(Rule::Archived, is_archived), (Rule::Failed, is_failed)];

#[derive(Debug, Clone, Copy, Default)]
pub struct RecordClassifier;

impl RecordClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify one record. `now` is the timestamp used when the relevant
    /// archive date is missing or unparseable.
    pub fn classify(
        &self,
        record: &MamRecord,
        now: DateTime<Utc>,
    ) -> Result<Classification, RecordError> {
        let rule = RULES
            .iter()
            .find(|(_, matches)| matches(record))
            .map(|(rule, _)| *rule);

        let Some(rule) = rule else {
            return Ok(Classification::Pending);
        };

        let pid = record
            .original_filename()
            .map(pid_from_filename)
            .filter(|p| !p.is_empty())
            .ok_or(RecordError::MissingFilename)?
            .to_string();

        Ok(match rule {
            Rule::Archived => Classification::Archived {
                pid,
                at: parse_archive_timestamp(record.archived_date(), now),
            },
            Rule::Failed => {
                let motivations = record.rejection_motivations();
                let message = if motivations.is_empty() {
                    DEFAULT_MAM_FAILURE_MESSAGE.to_string()
                } else {
                    motivations.join("\n")
                };
                Classification::Failed {
                    pid,
                    at: parse_archive_timestamp(record.rejection_date(), now),
                    message,
                }
            }
        })
    }
}

/// `"p1.zip"` -> `"p1"`. Names without the suffix are returned unchanged.
pub fn pid_from_filename(filename: &str) -> &str {
    filename.strip_suffix(".zip").unwrap_or(filename)
}

/// Parse an archive date. Accepts RFC 3339, or an ISO date-time / date
/// without offset (read as UTC). Anything else yields `fallback`.
pub fn parse_archive_timestamp(raw: Option<&str>, fallback: DateTime<Utc>) -> DateTime<Utc> {
    let Some(s) = raw.map(str::trim) else {
        return fallback;
    };
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return t.with_timezone(&Utc);
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return t.and_utc();
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(t) = d.and_hms_opt(0, 0, 0) {
            return t.and_utc();
        }
    }
    fallback
}
