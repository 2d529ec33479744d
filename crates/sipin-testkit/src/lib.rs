//! sipin-testkit
//!
//! In-process doubles for the reconciliation seams, used ONLY by tests:
//! - [`InMemoryStateStore`]: same guards as the Postgres store.
//! - [`ScriptedRecordSource`]: archive lookup returning queued pages.
//! - [`ChannelSubscription`]: event subscription fed from a channel, recording
//!   acks and nacks.
//!
//! Plus [`fixtures`] for building events and archive records.

pub mod fixtures;

mod memory_store;
mod scripted_source;
mod subscription;

pub use memory_store::InMemoryStateStore;
pub use scripted_source::ScriptedRecordSource;
pub use subscription::{ChannelSubscription, SubscriptionHandle, SubscriptionLog, SubscriptionView};
