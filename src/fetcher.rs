//! Paginated fetching of one query window.
//!
//! Page 1 is always fetched first to learn `total_pages`. The rest follow
//! one of two strategies:
//!
//! | Strategy | Requests | Stops early |
//! |----------|----------|-------------|
//! | [`FetchStrategy::Sequential`] | one at a time, fixed delay between them | optionally, once a page reaches before the window start |
//! | [`FetchStrategy::Concurrent`] | bounded fan-out via `buffer_unordered` | never |
//!
//! Either way pages are reassembled in ascending page order, so repeated runs
//! against an unchanged corpus produce identical output.

use crate::api::{SearchApi, SearchField};
use crate::error::IngestError;
use crate::models::{QueryWindow, RawArticle, SearchPage};
use chrono::NaiveDate;
use futures::stream::{self, StreamExt, TryStreamExt};
use itertools::Itertools;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// One request at a time with `delay` between requests.
    ///
    /// `early_stop` is only sound when the API returns newest records first.
    Sequential { delay: Duration, early_stop: bool },
    /// Up to `max_in_flight` page requests at once.
    Concurrent { max_in_flight: usize },
}

/// Everything one window returned, in page order.
#[derive(Debug, Default)]
pub struct FetchedWindow {
    pub articles: Vec<RawArticle>,
    /// `total_results` as reported by the first page.
    pub total_results: u64,
    pub pages_fetched: u32,
}

pub struct Fetcher<A> {
    api: A,
    strategy: FetchStrategy,
    order_field: SearchField,
}

impl<A: SearchApi> Fetcher<A> {
    /// `order_field` is the field the API filters and sorts on; early stop
    /// reads record dates from it.
    pub fn new(api: A, strategy: FetchStrategy, order_field: SearchField) -> Self {
        Self {
            api,
            strategy,
            order_field,
        }
    }

    #[cfg(test)]
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Fetch every page of `window`.
    ///
    /// Any failed page fails the whole window with
    /// [`IngestError::FetchFailed`]; nothing is retried.
    #[instrument(level = "info", skip_all, fields(window = %window))]
    pub async fn fetch(&self, window: &QueryWindow) -> Result<FetchedWindow, IngestError> {
        let first = self.page(window, 1).await?;
        let total_pages = first.total_pages;
        let total_results = first.total_results;
        info!(total_pages, total_results, "Fetched first page");

        let mut pages = vec![(1, first)];
        let mut stopped_early = false;

        if total_pages > 1 {
            match self.strategy {
                FetchStrategy::Sequential { delay, early_stop } => {
                    let stop_before = if early_stop { window.start() } else { None };
                    for page in 2..=total_pages {
                        let last = pages.last().map(|(_, p)| p);
                        if last.is_some_and(|p| self.reaches_before(p, stop_before)) {
                            info!(
                                page = page - 1,
                                "Oldest record predates window; stopping early"
                            );
                            stopped_early = true;
                            break;
                        }
                        sleep(delay).await;
                        pages.push((page, self.page(window, page).await?));
                    }
                }
                FetchStrategy::Concurrent { max_in_flight } => {
                    debug!(
                        max_in_flight,
                        remaining = total_pages - 1,
                        "Fanning out page requests"
                    );
                    let rest: Vec<(u32, SearchPage)> = stream::iter(2..=total_pages)
                        .map(|page| async move {
                            let envelope = self.page(window, page).await?;
                            Ok::<_, IngestError>((page, envelope))
                        })
                        .buffer_unordered(max_in_flight.max(1))
                        .try_collect()
                        .await?;
                    pages.extend(rest);
                }
            }
        }

        let pages_fetched = pages.len() as u32;
        let articles: Vec<RawArticle> = pages
            .into_iter()
            .sorted_by_key(|(page, _)| *page)
            .flat_map(|(_, p)| p.results)
            .collect();

        if !stopped_early && articles.len() as u64 != total_results {
            warn!(
                fetched = articles.len(),
                total_results,
                "Fetched result count differs from reported total"
            );
        }
        info!(pages_fetched, articles = articles.len(), "Window fetched");

        Ok(FetchedWindow {
            articles,
            total_results,
            pages_fetched,
        })
    }

    async fn page(&self, window: &QueryWindow, page: u32) -> Result<SearchPage, IngestError> {
        let envelope = self
            .api
            .search(window, page)
            .await
            .map_err(|source| IngestError::FetchFailed { page, source })?;
        if envelope.page_number != page {
            warn!(
                requested = page,
                returned = envelope.page_number,
                "Page number mismatch"
            );
        }
        Ok(envelope)
    }

    /// Whether the oldest dated record on `page` falls before `start`.
    fn reaches_before(&self, page: &SearchPage, start: Option<NaiveDate>) -> bool {
        let oldest = page
            .results
            .iter()
            .filter_map(|a| self.order_field.date_of(a))
            .min();
        matches!((oldest, start), (Some(oldest), Some(start)) if oldest < start)
    }
}
