//! Background contexts: the timer-driven poller and the event-driven
//! listener. Both observe the same [`Shutdown`] and share nothing but the
//! store behind them.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::error;

use sipin_reconcile::{
    poll_loop, run_listener, EventSubscription, ListenerStats, MamReconciler, Shutdown,
};

use crate::state::AppState;

/// Run poll cycles every `interval` until shutdown. Resolves to the number
/// of cycles run.
pub fn spawn_poller(
    state: Arc<AppState>,
    reconciler: MamReconciler,
    interval: Duration,
    shutdown: Shutdown,
) -> JoinHandle<u64> {
    tokio::spawn(async move {
        poll_loop(&reconciler, interval, shutdown, |report| {
            state.record_cycle(report)
        })
        .await
    })
}

/// Consume `sub` until it closes or shutdown fires. A transport failure
/// ends the listener and is logged.
pub fn spawn_listener<S>(
    state: Arc<AppState>,
    mut sub: S,
    shutdown: Shutdown,
) -> JoinHandle<Option<ListenerStats>>
where
    S: EventSubscription + 'static,
{
    tokio::spawn(async move {
        let handler = state.handler.clone();
        let res = run_listener(&handler, &mut sub, shutdown, |outcome| {
            state.record_bus_event(outcome)
        })
        .await;
        match res {
            Ok(stats) => Some(stats),
            Err(e) => {
                error!(error = %e, "listener stopped on transport error");
                None
            }
        }
    })
}
