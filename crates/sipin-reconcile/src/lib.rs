//! sipin-reconcile
//!
//! State reconciliation core for SIP ingest.
//!
//! Two uncoordinated sources report on the same row:
//! - pipeline events, handled one at a time by [`EventHandler`] under
//!   [`run_listener`];
//! - periodic archive polling, run by [`MamReconciler`] under [`poll_loop`].
//!
//! Neither path takes a lock. Convergence comes from the guards on every
//! [`sipin_db::StateStore`] write, which make the two paths commutative.
//! Classification ([`classify_event`], [`RecordClassifier`]) and query
//! construction ([`MediaHavenQuery`]) are pure.

mod engine;
mod event;
mod listener;
mod query;
mod record;
mod shutdown;

pub use engine::{poll_loop, CycleReport, MamReconciler};
pub use event::{classify_event, EventDecision, EventHandler, EventVerdict, HandleError};
pub use listener::{run_listener, Delivery, EventSubscription, ListenerStats, CONSUMER_TOPICS};
pub use query::{EmptyInputError, MediaHavenQuery};
pub use record::{
    parse_archive_timestamp, pid_from_filename, Classification, RecordClassifier, RecordError,
    REJECTION_FAMILY,
};
pub use shutdown::{shutdown_channel, Shutdown, ShutdownTrigger};
