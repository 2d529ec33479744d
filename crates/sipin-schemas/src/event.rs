use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

// ---------------------------------------------------------------------------
// Outcome marker
// ---------------------------------------------------------------------------

/// Outcome marker carried by a pipeline event (and optionally by its payload).
///
/// Unrecognised markers are preserved verbatim in `Other` and are never
/// treated as success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Success,
    Fail,
    Warning,
    Other(String),
}

impl EventOutcome {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" => EventOutcome::Success,
            "fail" => EventOutcome::Fail,
            "warning" => EventOutcome::Warning,
            _ => EventOutcome::Other(s.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventOutcome::Success => "success",
            EventOutcome::Fail => "fail",
            EventOutcome::Warning => "warning",
            EventOutcome::Other(s) => s.as_str(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, EventOutcome::Success)
    }
}

// ---------------------------------------------------------------------------
// MalformedEvent
// ---------------------------------------------------------------------------

/// A pipeline event whose required fields are missing or unparseable.
///
/// Surfaced to the transport boundary, which negatively acknowledges the
/// delivery so it can be redelivered or dead-lettered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedEvent {
    /// Name of the offending field (`"id"`, `"time"`, `"data.is_valid"`, ...).
    pub field: &'static str,
    pub reason: String,
}

impl MalformedEvent {
    fn missing(field: &'static str) -> Self {
        Self {
            field,
            reason: "missing or empty".to_string(),
        }
    }
}

impl std::fmt::Display for MalformedEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed event: field '{}' {}", self.field, self.reason)
    }
}

impl std::error::Error for MalformedEvent {}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Optional payload of a pipeline event. Every field is optional; absence
/// never fails classification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EventData {
    #[serde(default)]
    pub is_valid: Option<bool>,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub pid: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl EventData {
    /// Payload outcome, if the payload carries a non-empty one.
    pub fn outcome(&self) -> Option<EventOutcome> {
        self.outcome
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(EventOutcome::parse)
    }

    /// Assigned pid, if the payload carries a non-blank one.
    pub fn pid(&self) -> Option<&str> {
        self.pid.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Failure message, if the payload carries a non-blank one.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref().filter(|s| !s.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// PipelineEvent
// ---------------------------------------------------------------------------

/// One validated lifecycle event from an upstream pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineEvent {
    pub id: String,
    pub correlation_id: String,
    pub event_type: String,
    pub time: DateTime<Utc>,
    pub outcome: EventOutcome,
    pub data: EventData,
}

/// Loose wire shape; validated into [`PipelineEvent`] by [`PipelineEvent::from_value`].
#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    correlation_id: Option<String>,
    #[serde(default, rename = "type")]
    event_type: Option<String>,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    outcome: Option<String>,
    #[serde(default)]
    data: Value,
}

fn required(v: Option<String>, field: &'static str) -> Result<String, MalformedEvent> {
    match v {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(MalformedEvent::missing(field)),
    }
}

impl PipelineEvent {
    /// Parse and validate a structured JSON event:
    /// `{id, correlation_id, type, time, outcome, data: {...}}`.
    pub fn from_value(v: &Value) -> Result<Self, MalformedEvent> {
        let raw: RawEvent = serde_json::from_value(v.clone()).map_err(|e| MalformedEvent {
            field: "event",
            reason: e.to_string(),
        })?;

        let id = required(raw.id, "id")?;
        let correlation_id = required(raw.correlation_id, "correlation_id")?;
        let event_type = required(raw.event_type, "type")?;
        let time_raw = required(raw.time, "time")?;
        let time = DateTime::parse_from_rfc3339(time_raw.trim())
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| MalformedEvent {
                field: "time",
                reason: format!("not RFC 3339 ({e}): {time_raw}"),
            })?;
        let outcome = EventOutcome::parse(&required(raw.outcome, "outcome")?);

        let data = match raw.data {
            Value::Null => EventData::default(),
            obj @ Value::Object(_) => serde_json::from_value(obj).map_err(|e| MalformedEvent {
                field: "data",
                reason: e.to_string(),
            })?,
            other => {
                return Err(MalformedEvent {
                    field: "data",
                    reason: format!("expected object, got {other}"),
                })
            }
        };

        Ok(Self {
            id,
            correlation_id,
            event_type,
            time,
            outcome,
            data,
        })
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, MalformedEvent> {
        let v: Value = serde_json::from_slice(bytes).map_err(|e| MalformedEvent {
            field: "event",
            reason: format!("invalid json: {e}"),
        })?;
        Self::from_value(&v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Value {
        json!({
            "id": "ev-1",
            "correlation_id": "c1",
            "type": "be.meemoo.sipin.sip.validate",
            "time": "2024-05-01T10:00:00+02:00",
            "outcome": "success",
            "data": {"is_valid": true, "pid": "p1"}
        })
    }

    #[test]
    fn parses_complete_event() {
        let ev = PipelineEvent::from_value(&base()).unwrap();
        assert_eq!(ev.correlation_id, "c1");
        assert_eq!(ev.outcome, EventOutcome::Success);
        assert_eq!(ev.time.to_rfc3339(), "2024-05-01T08:00:00+00:00");
        assert_eq!(ev.data.is_valid, Some(true));
        assert_eq!(ev.data.pid(), Some("p1"));
        assert_eq!(ev.data.outcome(), None);
    }

    #[test]
    fn missing_data_is_empty_payload() {
        let mut v = base();
        v.as_object_mut().unwrap().remove("data");
        let ev = PipelineEvent::from_value(&v).unwrap();
        assert_eq!(ev.data, EventData::default());
    }

    #[test]
    fn missing_correlation_id_is_malformed() {
        let mut v = base();
        v["correlation_id"] = json!("  ");
        let err = PipelineEvent::from_value(&v).unwrap_err();
        assert_eq!(err.field, "correlation_id");
    }

    #[test]
    fn unparseable_time_is_malformed() {
        let mut v = base();
        v["time"] = json!("yesterday");
        let err = PipelineEvent::from_value(&v).unwrap_err();
        assert_eq!(err.field, "time");
        assert!(err.to_string().contains("yesterday"));
    }

    #[test]
    fn non_object_data_is_malformed() {
        let mut v = base();
        v["data"] = json!("oops");
        assert_eq!(PipelineEvent::from_value(&v).unwrap_err().field, "data");
    }

    #[test]
    fn unknown_outcome_is_kept_and_not_success() {
        let o = EventOutcome::parse("partial");
        assert_eq!(o, EventOutcome::Other("partial".to_string()));
        assert!(!o.is_success());
        assert_eq!(EventOutcome::parse(" FAIL "), EventOutcome::Fail);
    }

    #[test]
    fn blank_payload_fields_read_as_absent() {
        let d = EventData {
            is_valid: None,
            outcome: Some(" ".to_string()),
            pid: Some("".to_string()),
            message: Some("   ".to_string()),
        };
        assert_eq!(d.outcome(), None);
        assert_eq!(d.pid(), None);
        assert_eq!(d.message(), None);
    }

    #[test]
    fn invalid_json_bytes_are_malformed() {
        let err = PipelineEvent::from_slice(b"{not json").unwrap_err();
        assert_eq!(err.field, "event");
    }
}
