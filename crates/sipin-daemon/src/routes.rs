//! Axum router and all HTTP handlers for sipin-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers so tests can use the bare router.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::warn;

use sipin_reconcile::HandleError;

use crate::{
    api_types::{EventCounters, EventErrorResponse, HealthResponse, StatusResponse},
    state::{uptime_secs, AppState},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/events", post(ingest_event))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(StatusResponse {
            daemon_uptime_secs: uptime_secs(),
            poller: st.poller_status(),
            events: EventCounters {
                bus: st.bus_events(),
                http: st.http_events(),
            },
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /v1/events
// ---------------------------------------------------------------------------

/// Apply one pushed pipeline event.
///
/// - 200 with the decision (a guarded no-op is still 200).
/// - 400 when the event is malformed; redelivering it will not help.
/// - 503 when the store failed; the pusher should redeliver.
pub(crate) async fn ingest_event(State(st): State<Arc<AppState>>, body: Bytes) -> Response {
    let outcome = st.handler.handle_slice(&body).await;
    st.record_http_event(&outcome);

    match outcome {
        Ok(decision) => (StatusCode::OK, Json(decision)).into_response(),
        Err(HandleError::Malformed(e)) => {
            warn!(field = e.field, error = %e, "rejected malformed event");
            (
                StatusCode::BAD_REQUEST,
                Json(EventErrorResponse {
                    error: "MALFORMED_EVENT",
                    message: e.to_string(),
                    field: Some(e.field),
                }),
            )
                .into_response()
        }
        Err(HandleError::Store(e)) => {
            warn!(op = e.op, error = %e, "store unavailable for pushed event");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(EventErrorResponse {
                    error: "STORE_UNAVAILABLE",
                    message: e.to_string(),
                    field: None,
                }),
            )
                .into_response()
        }
    }
}
