//! Command-line interface definitions.
//!
//! Every option can also come from the environment, which is how the
//! scheduled deployment passes the API credentials and the processing date.

use crate::api::SearchField;
use crate::fetcher::FetchStrategy;
use crate::models::ProcessingTarget;
use crate::normalizer::TimestampSource;
use chrono::{Local, NaiveDate};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # Today's articles (or the date in QC_DATAFLEET_DEPLOYMENT_DATE)
/// regalytics_ingest --api-key KEY
///
/// # Historical backfill attributed by sourced_at
/// regalytics_ingest --start-date 2020-01-01 --end-date 2021-07-27 \
///     --search-field sourced-at --timestamp-source sourced-at-next-business-day
///
/// # Everything the API has
/// regalytics_ingest --all --strategy sequential
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Base URL of the RegAlytics API
    #[arg(
        long,
        env = "REGALYTICS_API_BASE_URL",
        default_value = "https://api.regalytics.ai/api/v3"
    )]
    pub api_base_url: String,

    /// RegAlytics API key
    #[arg(
        long,
        env = "REGALYTICS_API_KEY",
        default_value = "",
        hide_env_values = true
    )]
    pub api_key: String,

    /// Date to process (YYYYMMDD or YYYY-MM-DD); defaults to today
    #[arg(long, env = "QC_DATAFLEET_DEPLOYMENT_DATE", value_parser = parse_date)]
    pub process_date: Option<NaiveDate>,

    /// First day of a range to process
    #[arg(long, value_parser = parse_date, requires = "end_date", conflicts_with = "all")]
    pub start_date: Option<NaiveDate>,

    /// Last day (inclusive) of a range to process
    #[arg(long, value_parser = parse_date, requires = "start_date", conflicts_with = "all")]
    pub end_date: Option<NaiveDate>,

    /// Process the entire corpus instead of a date
    #[arg(long)]
    pub all: bool,

    /// Directory the per-day files are written to
    #[arg(
        short,
        long,
        env = "REGALYTICS_OUTPUT_DIR",
        default_value = "/temp-output-directory/alternative/regalytics/articles"
    )]
    pub output_dir: PathBuf,

    /// Date field the search filters on
    #[arg(long, value_enum, default_value_t = SearchField::CreatedAt)]
    pub search_field: SearchField,

    /// Field that decides which day an article is filed under
    #[arg(long, value_enum, default_value_t = TimestampSource::CreatedAt)]
    pub timestamp_source: TimestampSource,

    /// How pages after the first are fetched
    #[arg(long, value_enum, default_value_t = Strategy::Concurrent)]
    pub strategy: Strategy,

    /// Upper bound on in-flight page requests (concurrent strategy)
    #[arg(long, default_value_t = 8)]
    pub max_concurrent_pages: usize,

    /// Pause between page requests (sequential strategy)
    #[arg(long, default_value_t = 1000)]
    pub page_delay_ms: u64,

    /// Stop paging once a page reaches before the window start (sequential strategy)
    #[arg(long)]
    pub early_stop: bool,

    /// Per-request timeout
    #[arg(long, default_value_t = 60)]
    pub request_timeout_secs: u64,

    /// Optional YAML file overriding where agency/state/country fields live
    #[arg(long, env = "REGALYTICS_FIELD_SCHEMA")]
    pub schema: Option<PathBuf>,

    /// Drop articles that list no agencies
    #[arg(long)]
    pub require_agencies: bool,

    /// Abort on the first malformed article instead of skipping it
    #[arg(long)]
    pub fail_fast: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    Sequential,
    Concurrent,
}

impl Cli {
    /// What this invocation should process.
    pub fn target(&self) -> ProcessingTarget {
        if self.all {
            return ProcessingTarget::EntireCorpus;
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            return ProcessingTarget::Range { start, end };
        }
        match self.process_date {
            Some(date) => ProcessingTarget::Date(date),
            None => ProcessingTarget::Date(Local::now().date_naive()),
        }
    }

    pub fn fetch_strategy(&self) -> FetchStrategy {
        match self.strategy {
            Strategy::Sequential => FetchStrategy::Sequential {
                delay: Duration::from_millis(self.page_delay_ms),
                early_stop: self.early_stop,
            },
            Strategy::Concurrent => FetchStrategy::Concurrent {
                max_in_flight: self.max_concurrent_pages,
            },
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Accepts `YYYYMMDD` and `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .map_err(|_| format!("`{s}` is not a YYYYMMDD or YYYY-MM-DD date"))
}
