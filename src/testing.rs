//! In-memory [`SearchApi`] used by the fetcher and pipeline tests.

use crate::api::SearchApi;
use crate::error::FetchError;
use crate::models::{QueryWindow, RawArticle, SearchPage};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct MockSearchApi {
    pages: HashMap<(QueryWindow, u32), SearchPage>,
    failures: HashMap<(QueryWindow, u32), u16>,
    latency: HashMap<u32, Duration>,
    calls: Mutex<Vec<(QueryWindow, u32)>>,
}

impl MockSearchApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `pages` as the full result of `window`, one `Vec` per page.
    pub fn with_window(mut self, window: QueryWindow, pages: Vec<Vec<Value>>) -> Self {
        let total_pages = pages.len() as u32;
        let total_results = pages.iter().map(Vec::len).sum::<usize>() as u64;
        for (i, results) in pages.into_iter().enumerate() {
            let page_number = i as u32 + 1;
            self.pages.insert(
                (window, page_number),
                SearchPage {
                    page_number,
                    total_pages,
                    total_results,
                    results: results.into_iter().map(RawArticle::from).collect(),
                },
            );
        }
        self
    }

    /// An empty result set: one page, zero totals.
    pub fn with_empty_window(mut self, window: QueryWindow) -> Self {
        self.pages.insert(
            (window, 1),
            SearchPage {
                page_number: 1,
                total_pages: 0,
                total_results: 0,
                results: Vec::new(),
            },
        );
        self
    }

    pub fn failing(mut self, window: QueryWindow, page: u32, status: u16) -> Self {
        self.failures.insert((window, page), status);
        self
    }

    /// Delay every request for `page`, across windows.
    pub fn slow(mut self, page: u32, delay: Duration) -> Self {
        self.latency.insert(page, delay);
        self
    }

    pub fn calls(&self) -> Vec<(QueryWindow, u32)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn pages_requested(&self, window: &QueryWindow) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter(|(w, _)| w == window)
            .map(|(_, p)| p)
            .collect()
    }
}

impl SearchApi for MockSearchApi {
    async fn search(&self, window: &QueryWindow, page: u32) -> Result<SearchPage, FetchError> {
        self.calls.lock().unwrap().push((*window, page));
        if let Some(delay) = self.latency.get(&page) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(status) = self.failures.get(&(*window, page)) {
            return Err(FetchError::Status {
                status: *status,
                body: "mock failure".into(),
            });
        }
        self.pages
            .get(&(*window, page))
            .cloned()
            .ok_or_else(|| FetchError::Status {
                status: 404,
                body: format!("no page {page} for {window}"),
            })
    }
}
