//! RegAlytics search API client.
//!
//! # Architecture
//!
//! - [`SearchApi`]: the seam the fetcher talks to; one call fetches one page
//! - [`RegalyticsClient`]: the reqwest implementation of the HTTP protocol
//!
//! # Protocol
//!
//! Dated windows `POST {base}/search` with
//! `{"apikey": ..., "search_options": {FIELD: {"start": ..., "end": ...}}}`;
//! the whole corpus is `POST {base}/get-all` with `{"apikey": ...}`.
//! Pages after the first add `?page=N`. Both answer with a
//! [`SearchPage`] envelope.

use crate::error::FetchError;
use crate::models::{QueryWindow, RawArticle, SearchPage};
use crate::normalizer::{leading_date, parse_instant};
use crate::utils::truncate_for_log;
use chrono::NaiveDate;
use clap::ValueEnum;
use serde_json::{Map, Value, json};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};
use url::Url;

/// Trait for fetching one page of search results.
///
/// Implementors must be side-effect free: the fetcher may issue several
/// pages of the same window concurrently.
pub trait SearchApi {
    async fn search(&self, window: &QueryWindow, page: u32) -> Result<SearchPage, FetchError>;
}

/// Date field the dated search filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SearchField {
    #[default]
    CreatedAt,
    SourcedAt,
}

impl SearchField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchField::CreatedAt => "created_at",
            SearchField::SourcedAt => "sourced_at",
        }
    }

    /// The date a record carries in this field, which is what the API
    /// filters and orders on.
    pub fn date_of(&self, raw: &RawArticle) -> Option<NaiveDate> {
        let text = raw.get(self.as_str())?.as_str()?.trim();
        parse_instant(text)
            .map(|ts| ts.date_naive())
            .or_else(|_| leading_date(text))
            .ok()
    }
}

#[derive(Debug)]
pub struct RegalyticsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    search_field: SearchField,
}

impl RegalyticsClient {
    /// Build a client for `base_url` (for example `https://api.regalytics.ai/api/v3`).
    ///
    /// Every request is bounded by `timeout`.
    pub fn new(
        base_url: &str,
        api_key: String,
        search_field: SearchField,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("regalytics_ingest/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            search_field,
        })
    }

    /// Endpoint URL for one page of a window.
    pub fn endpoint(&self, window: &QueryWindow, page: u32) -> Result<Url, url::ParseError> {
        let path = match window {
            QueryWindow::Range { .. } => "search",
            QueryWindow::All => "get-all",
        };
        let mut url = Url::parse(&format!("{}/{}", self.base_url, path))?;
        if page > 1 {
            url.query_pairs_mut().append_pair("page", &page.to_string());
        }
        Ok(url)
    }

    /// JSON body for a window.
    pub fn body(&self, window: &QueryWindow) -> Value {
        match window {
            QueryWindow::Range { start, end } => {
                let mut options = Map::new();
                options.insert(
                    self.search_field.as_str().to_string(),
                    json!({
                        "start": start.format("%Y-%m-%d").to_string(),
                        "end": end.format("%Y-%m-%d").to_string(),
                    }),
                );
                json!({ "apikey": self.api_key, "search_options": options })
            }
            QueryWindow::All => json!({ "apikey": self.api_key }),
        }
    }
}

impl SearchApi for RegalyticsClient {
    #[instrument(level = "info", skip_all, fields(window = %window, page = page))]
    async fn search(&self, window: &QueryWindow, page: u32) -> Result<SearchPage, FetchError> {
        let t0 = Instant::now();
        let url = self.endpoint(window, page)?;

        let body = self.body(window);
        let resp = self.client.post(url).json(&body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        let dt = t0.elapsed();

        if !status.is_success() {
            warn!(
                status = status.as_u16(),
                elapsed_ms = dt.as_millis() as u64,
                body = %truncate_for_log(&text, 300),
                "Search request rejected"
            );
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: truncate_for_log(&text, 300),
            });
        }

        match serde_json::from_str::<SearchPage>(&text) {
            Ok(envelope) => {
                debug!(
                    elapsed_ms = dt.as_millis() as u64,
                    results = envelope.results.len(),
                    total_pages = envelope.total_pages,
                    "Fetched search page"
                );
                Ok(envelope)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    body = %truncate_for_log(&text, 300),
                    "Search response is not a page envelope"
                );
                Err(e.into())
            }
        }
    }
}
