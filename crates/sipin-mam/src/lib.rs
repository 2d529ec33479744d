//! sipin-mam
//!
//! Archive-system (MediaHaven) boundary.
//!
//! This crate owns the [`RecordSource`] seam and its MediaHaven-backed
//! implementation. It does **not** classify records or write to the DB; it
//! returns raw JSON records and leaves decoding to the reconciler so that a
//! single malformed record cannot fail a whole page.

mod client;
mod token;

pub use client::{MediaHavenClient, MAX_PAGES, RECORDS_PATH};
pub use token::{RopcGrant, TOKEN_PATH};

use anyhow::Result;
use serde_json::Value;

/// Bulk record lookup against the archive system.
///
/// Implementations must be `Send + Sync` so the poller can hold an
/// `Arc<dyn RecordSource>` across task boundaries.
#[async_trait::async_trait]
pub trait RecordSource: Send + Sync {
    /// Human-readable name identifying this source (e.g. `"mediahaven"`).
    fn source_name(&self) -> &'static str;

    /// Run `query` and return every matching record, all pages exhausted.
    async fn search_all(&self, query: &str) -> Result<Vec<Value>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Minimal in-process source that satisfies the trait.
    struct Fixed(Vec<Value>);

    #[async_trait::async_trait]
    impl RecordSource for Fixed {
        fn source_name(&self) -> &'static str {
            "fixed"
        }

        async fn search_all(&self, _query: &str) -> Result<Vec<Value>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn trait_object_is_usable() {
        let src: Box<dyn RecordSource> = Box::new(Fixed(vec![json!({"a": 1})]));
        assert_eq!(src.source_name(), "fixed");
        assert_eq!(src.search_all("q").await.unwrap().len(), 1);
    }
}
