//! Scenario: Classification is ordered, total, and guarded against empty lookups
//!
//! # Invariants under test
//!
//! 1. A failing event outcome marker fails regardless of payload fields.
//! 2. A successful marker with no payload `outcome` and `is_valid=true` succeeds.
//! 3. `completed` + `Rejected` classifies as archived (first match wins).
//! 4. Records missing any field never error unless they match a terminal rule.
//! 5. The bulk lookup OR-combines every pid inside both scope filters.
//! 6. An empty pid list refuses to build a query.
//!
//! All tests are pure in-process; no DB or network required.

use chrono::{TimeZone, Utc};
use serde_json::json;

use sipin_reconcile::{
    classify_event, Classification, EmptyInputError, EventVerdict, MediaHavenQuery,
    RecordClassifier,
};
use sipin_schemas::{MamRecord, PipelineEvent};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn event(outcome: &str, data: serde_json::Value) -> PipelineEvent {
    PipelineEvent::from_value(&json!({
        "id": "evt-1",
        "correlation_id": "c1",
        "type": "sipin.transform",
        "time": "2024-02-01T12:00:00Z",
        "outcome": outcome,
        "data": data,
    }))
    .unwrap()
}

// ---------------------------------------------------------------------------
// 1-2. Event classification
// ---------------------------------------------------------------------------

#[test]
fn failing_marker_dominates_payload() {
    for data in [
        json!(null),
        json!({"is_valid": true}),
        json!({"outcome": "success", "is_valid": true, "pid": "p1"}),
    ] {
        assert_eq!(
            classify_event(&event("fail", data.clone())),
            EventVerdict::Failure,
            "data={data}"
        );
    }
}

#[test]
fn successful_marker_without_payload_outcome_and_valid_succeeds() {
    assert_eq!(
        classify_event(&event("success", json!({"is_valid": true}))),
        EventVerdict::Success
    );
}

// ---------------------------------------------------------------------------
// 3-4. Record classification
// ---------------------------------------------------------------------------

#[test]
fn contradictory_completed_and_rejected_is_archived() {
    let rec = MamRecord::from_value(&json!({
        "Internal": {"ArchiveStatus": "completed"},
        "Administrative": {"RecordStatus": "Rejected"},
        "Descriptive": {"OriginalFilename": "p9.zip"}
    }))
    .unwrap();
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    match RecordClassifier::new().classify(&rec, now).unwrap() {
        Classification::Archived { pid, at } => {
            assert_eq!(pid, "p9");
            assert_eq!(at, now, "no ArchivedDate falls back to now");
        }
        other => panic!("expected Archived, got {other:?}"),
    }
}

#[test]
fn partial_records_are_pending_not_errors() {
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    for v in [
        json!({}),
        json!({"Internal": {}}),
        json!({"Administrative": {"RecordStatus": null}}),
        json!({"Internal": {"ArchiveStatus": "completed"}}),
        json!({"Administrative": {"RecordStatus": "Published"}}),
    ] {
        let rec = MamRecord::from_value(&v).unwrap();
        assert_eq!(
            RecordClassifier::new().classify(&rec, now).unwrap(),
            Classification::Pending,
            "record={v}"
        );
    }
}

// ---------------------------------------------------------------------------
// 5-6. Query builder
// ---------------------------------------------------------------------------

#[test]
fn query_or_combines_pids_within_scope() {
    let q = MediaHavenQuery::new().pids(["A", "B"]).unwrap().build();
    assert!(q.contains(r#"OriginalFilename:"A.zip""#));
    assert!(q.contains(r#"OriginalFilename:"B.zip""#));
    assert!(q.starts_with("+(Administrative.DeleteStatus:*)+(IsInIngestSpace:*)"));
    assert!(q.ends_with(r#"+(OriginalFilename:"A.zip" OriginalFilename:"B.zip")"#));
}

#[test]
fn empty_pid_list_is_refused() {
    let none: Vec<String> = Vec::new();
    assert_eq!(
        MediaHavenQuery::new().pids(&none).unwrap_err(),
        EmptyInputError
    );
}
