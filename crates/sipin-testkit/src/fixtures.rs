//! Builders for test inputs.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

/// Fixed epoch offset so test timestamps read as small integers.
pub fn t(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Pipeline event JSON in the wire shape the listener consumes.
pub fn event_json(
    id: &str,
    correlation_id: &str,
    event_type: &str,
    time: DateTime<Utc>,
    outcome: &str,
    data: Value,
) -> Value {
    json!({
        "id": id,
        "correlation_id": correlation_id,
        "type": event_type,
        "time": time.to_rfc3339(),
        "outcome": outcome,
        "data": data,
    })
}

/// Archive record that classifies as archived.
pub fn archived_record(pid: &str, archived_at: DateTime<Utc>) -> Value {
    json!({
        "Internal": {"ArchiveStatus": "completed"},
        "Administrative": {
            "RecordStatus": "Published",
            "ArchivedDate": archived_at.to_rfc3339(),
        },
        "Descriptive": {"OriginalFilename": format!("{pid}.zip")},
    })
}

/// Archive record rejected with the given motivations.
pub fn rejected_record(pid: &str, rejected_at: DateTime<Utc>, motivations: &[&str]) -> Value {
    let rejections: Vec<Value> = motivations
        .iter()
        .map(|m| json!({"Motivation": m}))
        .collect();
    json!({
        "Internal": {"ArchiveStatus": "in_progress"},
        "Administrative": {
            "RecordStatus": "Rejected",
            "RejectionDate": rejected_at.to_rfc3339(),
            "RecordRejections": {"Rejection": rejections},
        },
        "Descriptive": {"OriginalFilename": format!("{pid}.zip")},
    })
}

/// Archive record still being processed.
pub fn pending_record(pid: &str) -> Value {
    json!({
        "Internal": {"ArchiveStatus": "on_disk"},
        "Administrative": {"RecordStatus": "Draft"},
        "Descriptive": {"OriginalFilename": format!("{pid}.zip")},
    })
}
