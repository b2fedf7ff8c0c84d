//! The fetch → normalize → bucket → write driver.
//!
//! One [`Pipeline::run`] handles one [`ProcessingTarget`]:
//!
//! 1. Split the target into query windows (one per day for ranges)
//! 2. Fetch each window; any failed page aborts the run before writing
//! 3. Normalize each article, dropping malformed ones (or aborting when
//!    fail-fast is on)
//! 4. Bucket by UTC day into a per-window accumulator, merged into the run's
//! 5. Write one file per non-empty bucket
//!
//! An explicit single date with zero results is an error rather than an empty
//! success: it usually means the source has not published that day yet.

use crate::api::SearchApi;
use crate::bucketer::DayBuckets;
use crate::error::IngestError;
use crate::fetcher::{FetchedWindow, Fetcher};
use crate::models::{ProcessingTarget, QueryWindow};
use crate::normalizer::Normalizer;
use crate::outputs::json;
use itertools::Itertools;
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

/// Counters reported at the end of a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub windows: usize,
    pub fetched: usize,
    pub normalized: usize,
    pub skipped: usize,
    pub files: Vec<PathBuf>,
}

pub struct Pipeline<A> {
    fetcher: Fetcher<A>,
    normalizer: Normalizer,
    output_dir: PathBuf,
    fail_fast: bool,
}

impl<A: SearchApi> Pipeline<A> {
    pub fn new(fetcher: Fetcher<A>, normalizer: Normalizer, output_dir: PathBuf) -> Self {
        Self {
            fetcher,
            normalizer,
            output_dir,
            fail_fast: false,
        }
    }

    /// Abort the run on the first malformed record instead of skipping it.
    pub fn fail_fast(mut self, yes: bool) -> Self {
        self.fail_fast = yes;
        self
    }

    #[instrument(level = "info", skip_all, fields(target = ?target))]
    pub async fn run(&self, target: &ProcessingTarget) -> Result<RunSummary, IngestError> {
        if let ProcessingTarget::Range { start, end } = target {
            if start > end {
                return Err(IngestError::Config(format!(
                    "start date {start} is after end date {end}"
                )));
            }
        }

        let windows = target.windows();
        let mut summary = RunSummary {
            windows: windows.len(),
            ..Default::default()
        };
        let mut run_buckets = DayBuckets::new();

        for window in &windows {
            let fetched = self.fetcher.fetch(window).await?;
            if fetched.total_results == 0 {
                if let ProcessingTarget::Date(date) = target {
                    return Err(IngestError::NoDataForDate(*date));
                }
                debug!(%window, "Window has no results");
                continue;
            }

            summary.fetched += fetched.articles.len();
            let window_buckets = self.normalize_window(window, fetched, &mut summary)?;
            run_buckets.merge(window_buckets);
        }

        if run_buckets.is_empty() {
            warn!("No articles survived normalization; nothing to write");
        }
        info!(
            buckets = run_buckets.len(),
            articles = run_buckets.article_count(),
            keys = %run_buckets.keys().join(","),
            "Bucketed articles"
        );

        summary.files = json::write_buckets(&self.output_dir, &run_buckets).await?;
        info!(
            windows = summary.windows,
            fetched = summary.fetched,
            normalized = summary.normalized,
            skipped = summary.skipped,
            files = summary.files.len(),
            "Run complete"
        );
        Ok(summary)
    }

    fn normalize_window(
        &self,
        window: &QueryWindow,
        fetched: FetchedWindow,
        summary: &mut RunSummary,
    ) -> Result<DayBuckets, IngestError> {
        let mut buckets = DayBuckets::new();
        for raw in fetched.articles {
            match self.normalizer.normalize(raw) {
                Ok(article) => {
                    summary.normalized += 1;
                    buckets.push(article);
                }
                Err(e) if self.fail_fast => return Err(e),
                Err(e) => {
                    summary.skipped += 1;
                    warn!(%window, error = %e, "Skipping malformed article");
                }
            }
        }
        Ok(buckets)
    }
}
