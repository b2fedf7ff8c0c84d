//! Newline-delimited JSON output, one file per day bucket.
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── 20220714.json
//! └── 20220715.json
//! ```
//!
//! Each line is one compact [`CanonicalArticle`]; lines are joined with `\n`
//! and there is no enclosing array. Existing files are overwritten.

use crate::bucketer::{DateBucketKey, DayBuckets};
use crate::error::IngestError;
use crate::models::CanonicalArticle;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument};

/// Path of the file holding `key`'s bucket.
pub fn bucket_path(output_dir: &Path, key: &DateBucketKey) -> PathBuf {
    output_dir.join(format!("{key}.json"))
}

/// Render articles as newline-delimited JSON.
pub fn to_ndjson(articles: &[CanonicalArticle]) -> Result<String, IngestError> {
    let lines = articles
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines.join("\n"))
}

/// Write one bucket, replacing any previous file for the same day.
#[instrument(level = "info", skip_all, fields(key = %key, count = articles.len()))]
pub async fn write_bucket(
    output_dir: &Path,
    key: &DateBucketKey,
    articles: &[CanonicalArticle],
) -> Result<PathBuf, IngestError> {
    let path = bucket_path(output_dir, key);
    let body = to_ndjson(articles)?;

    debug!(path = %path.display(), bytes = body.len(), "Writing bucket");
    fs::write(&path, body).await.map_err(|source| IngestError::Output {
        path: path.clone(),
        source,
    })?;
    info!(path = %path.display(), "Wrote bucket file");
    Ok(path)
}

/// Write every non-empty bucket, in ascending day order.
#[instrument(
    level = "info",
    skip_all,
    fields(output_dir = %output_dir.display(), buckets = buckets.len())
)]
pub async fn write_buckets(
    output_dir: &Path,
    buckets: &DayBuckets,
) -> Result<Vec<PathBuf>, IngestError> {
    fs::create_dir_all(output_dir)
        .await
        .map_err(|source| IngestError::Output {
            path: output_dir.to_path_buf(),
            source,
        })?;

    let mut written = Vec::with_capacity(buckets.len());
    for (key, articles) in buckets.iter() {
        if articles.is_empty() {
            continue;
        }
        written.push(write_bucket(output_dir, key, articles).await?);
    }
    Ok(written)
}

/// Read a bucket file back, one article per line.
#[cfg(test)]
pub async fn read_bucket(path: &Path) -> Result<Vec<CanonicalArticle>, IngestError> {
    let text = fs::read_to_string(path)
        .await
        .map_err(|source| IngestError::Output {
            path: path.to_path_buf(),
            source,
        })?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(IngestError::from))
        .collect()
}
