//! MediaHaven REST client: paginated record search behind a cached ROPC token.

use anyhow::{anyhow, Context, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::token::{CachedToken, RopcGrant};
use crate::RecordSource;

pub const RECORDS_PATH: &str = "/mediahaven-rest-api/v2/records";

/// Page cap for one `search_all`. Reaching it is an error, never a partial result.
pub const MAX_PAGES: usize = 10_000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SearchPage {
    #[serde(default)]
    total_nr_of_results: u64,
    #[serde(default)]
    nr_of_results: u64,
    #[serde(default)]
    results: Vec<Value>,
}

/// MediaHaven-backed [`RecordSource`].
///
/// Credentials are passed in by the caller (daemon/CLI); do not log them.
pub struct MediaHavenClient {
    http: reqwest::Client,
    base_url: String,
    grant: RopcGrant,
    page_size: u32,
    max_pages: usize,
    token: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for MediaHavenClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaHavenClient")
            .field("base_url", &self.base_url)
            .field("grant", &self.grant)
            .field("page_size", &self.page_size)
            .field("max_pages", &self.max_pages)
            .finish()
    }
}

impl MediaHavenClient {
    pub fn new(base_url: String, grant: RopcGrant, page_size: u32) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            grant,
            page_size: page_size.max(1),
            max_pages: MAX_PAGES,
            token: Mutex::new(None),
        }
    }

    /// Override the page cap (default [`MAX_PAGES`]).
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    fn records_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), RECORDS_PATH)
    }

    async fn access_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(tok) = guard.as_ref() {
            if tok.is_fresh(std::time::Instant::now()) {
                return Ok(tok.access_token.clone());
            }
        }
        let fresh = self.grant.request_token(&self.http, &self.base_url).await?;
        let out = fresh.access_token.clone();
        *guard = Some(fresh);
        Ok(out)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    async fn fetch_page(&self, query: &str, start_index: u64) -> Result<SearchPage> {
        let start_s = start_index.to_string();
        let size_s = self.page_size.to_string();

        // One retry after a 401: the cached token may have been revoked early.
        for attempt in 0..2 {
            let token = self.access_token().await?;
            let resp = self
                .http
                .get(self.records_url())
                .bearer_auth(&token)
                .header(reqwest::header::ACCEPT, "application/json")
                .query(&[
                    ("q", query),
                    ("startIndex", start_s.as_str()),
                    ("nrOfResults", size_s.as_str()),
                ])
                .send()
                .await
                .context("mediahaven search request failed")?;

            let status = resp.status();
            if status == StatusCode::UNAUTHORIZED && attempt == 0 {
                warn!(event = "mam_token_rejected", "mediahaven rejected token; refreshing");
                self.invalidate_token().await;
                continue;
            }
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(anyhow!(
                    "mediahaven http error status={} body={}",
                    status.as_u16(),
                    truncate(&text, 200)
                ));
            }

            return resp
                .json::<SearchPage>()
                .await
                .context("mediahaven search response json decode failed");
        }

        Err(anyhow!("mediahaven search unauthorized after token refresh"))
    }
}

#[async_trait::async_trait]
impl RecordSource for MediaHavenClient {
    fn source_name(&self) -> &'static str {
        "mediahaven"
    }

    async fn search_all(&self, query: &str) -> Result<Vec<Value>> {
        let mut out: Vec<Value> = Vec::new();
        let mut start_index: u64 = 0;
        let mut total: u64 = 0;

        for _ in 0..self.max_pages {
            let page = self.fetch_page(query, start_index).await?;
            let got = page.results.len() as u64;
            total = page.total_nr_of_results;
            debug!(
                event = "mam_page",
                start_index,
                got,
                total,
                "mediahaven page fetched"
            );
            out.extend(page.results);

            if got == 0 {
                return Ok(out);
            }
            start_index += page.nr_of_results.max(got);
            if start_index >= total {
                return Ok(out);
            }
        }

        warn!(
            event = "mam_page_cap",
            max_pages = self.max_pages,
            fetched = out.len(),
            total,
            "mediahaven search hit the page cap"
        );
        Err(anyhow!(
            "mediahaven search incomplete: stopped after {} pages with {} of {} results",
            self.max_pages,
            out.len(),
            total
        ))
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
