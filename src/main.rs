//! # RegAlytics Ingest
//!
//! Pulls regulatory articles from the RegAlytics search API and writes them
//! as one newline-delimited JSON file per UTC day, for use as an alternative
//! data feed.
//!
//! ## Usage
//!
//! ```sh
//! REGALYTICS_API_KEY=... regalytics_ingest --process-date 20220714 -o ./articles
//! ```
//!
//! ## Architecture
//!
//! One invocation runs one pipeline:
//! 1. **Fetching**: every page of each query window, in page order
//! 2. **Normalizing**: flatten agencies, coerce flags, convert `created_at` to UTC
//! 3. **Bucketing**: group by the UTC date of `created_at`
//! 4. **Output**: `<output-dir>/<YYYYMMDD>.json`, overwriting earlier runs

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod bucketer;
mod cli;
mod error;
mod fetcher;
mod models;
mod normalizer;
mod outputs;
mod pipeline;
#[cfg(test)]
mod testing;
mod utils;

use api::RegalyticsClient;
use cli::Cli;
use fetcher::Fetcher;
use normalizer::{FieldSchema, Normalizer};
use pipeline::Pipeline;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("regalytics_ingest starting up");

    let args = Cli::parse();
    let target = args.target();
    debug!(?target, output_dir = %args.output_dir.display(), "Parsed CLI arguments");

    if args.api_key.is_empty() {
        error!("No API key configured (set REGALYTICS_API_KEY or pass --api-key)");
        return Err("missing API key".into());
    }

    // Early check: fail before fetching if nothing could be written
    if let Err(e) = ensure_writable_dir(&args.output_dir).await {
        error!(
            path = %args.output_dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let schema = match &args.schema {
        Some(path) => {
            let schema = FieldSchema::from_yaml_file(path)?;
            info!(path = %path.display(), ?schema, "Loaded field schema");
            schema
        }
        None => FieldSchema::default(),
    };
    let normalizer =
        Normalizer::new(schema, args.timestamp_source).require_agencies(args.require_agencies);

    let client = RegalyticsClient::new(
        &args.api_base_url,
        args.api_key.clone(),
        args.search_field,
        args.request_timeout(),
    )?;
    let fetcher = Fetcher::new(client, args.fetch_strategy(), args.search_field);
    let pipeline =
        Pipeline::new(fetcher, normalizer, args.output_dir.clone()).fail_fast(args.fail_fast);

    let summary = match pipeline.run(&target).await {
        Ok(summary) => summary,
        Err(e) => {
            error!(?target, error = %e, "Run failed");
            return Err(e.into());
        }
    };

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        files = summary.files.len(),
        normalized = summary.normalized,
        skipped = summary.skipped,
        "Execution complete"
    );

    Ok(())
}
