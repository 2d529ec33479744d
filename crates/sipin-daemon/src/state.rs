//! Shared runtime state for sipin-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. Background tasks
//! (poller, listener) publish into the same state through `watch` senders,
//! which are written from synchronous callbacks and read without awaiting.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use sipin_reconcile::{CycleReport, EventDecision, EventHandler, HandleError, ListenerStats};

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health / status responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// Poller status
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PollerStatus {
    pub enabled: bool,
    pub interval_secs: u64,
    pub cycles_run: u64,
    pub last_cycle: Option<CycleReport>,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

pub struct AppState {
    pub build: BuildInfo,
    /// Applies pushed and subscribed events to the store.
    pub handler: EventHandler,
    poller: watch::Sender<PollerStatus>,
    bus_events: watch::Sender<ListenerStats>,
    http_events: watch::Sender<ListenerStats>,
}

impl AppState {
    pub fn new(handler: EventHandler, poller_enabled: bool, interval_secs: u64) -> Self {
        let (poller, _) = watch::channel(PollerStatus {
            enabled: poller_enabled,
            interval_secs,
            ..PollerStatus::default()
        });
        let (bus_events, _) = watch::channel(ListenerStats::default());
        let (http_events, _) = watch::channel(ListenerStats::default());
        Self {
            build: BuildInfo {
                service: "sipin-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            handler,
            poller,
            bus_events,
            http_events,
        }
    }

    pub fn record_cycle(&self, report: CycleReport) {
        self.poller.send_modify(|p| {
            p.cycles_run += 1;
            p.last_cycle = Some(report);
        });
    }

    /// Count an event taken from a bus subscription.
    pub fn record_bus_event(&self, outcome: &Result<EventDecision, HandleError>) {
        self.bus_events.send_modify(|s| s.record(outcome));
    }

    /// Count an event pushed over `POST /v1/events`.
    pub fn record_http_event(&self, outcome: &Result<EventDecision, HandleError>) {
        self.http_events.send_modify(|s| s.record(outcome));
    }

    pub fn poller_status(&self) -> PollerStatus {
        self.poller.borrow().clone()
    }

    pub fn bus_events(&self) -> ListenerStats {
        self.bus_events.borrow().clone()
    }

    pub fn http_events(&self) -> ListenerStats {
        self.http_events.borrow().clone()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}
