//! Response types for all sipin-daemon HTTP endpoints.
//!
//! No business logic lives here.

use serde::Serialize;

use sipin_reconcile::ListenerStats;

use crate::state::PollerStatus;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// /v1/status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct EventCounters {
    /// Deliveries taken from a bus subscription.
    pub bus: ListenerStats,
    /// Events pushed over `POST /v1/events`.
    pub http: ListenerStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub daemon_uptime_secs: u64,
    pub poller: PollerStatus,
    pub events: EventCounters,
}

// ---------------------------------------------------------------------------
// POST /v1/events errors (400 / 503)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct EventErrorResponse {
    /// `"MALFORMED_EVENT"` | `"STORE_UNAVAILABLE"`
    pub error: &'static str,
    pub message: String,
    /// Offending field for malformed events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
}
