//! Error taxonomy for the ingestion pipeline.
//!
//! - [`IngestError::MalformedRecord`]: one article could not be normalized.
//!   The driver logs and drops it unless running fail-fast.
//! - [`IngestError::FetchFailed`]: a page request did not return a usable
//!   envelope. Fatal for the window, never retried here.
//! - [`IngestError::NoDataForDate`]: the remote source had nothing for an
//!   explicitly requested date.

use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

/// Why a single page request failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("unusable response envelope: {0}")]
    Envelope(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed record (id {}): {reason}", .id.as_deref().unwrap_or("unknown"))]
    MalformedRecord { id: Option<String>, reason: String },

    #[error("fetch failed for page {page}: {source}")]
    FetchFailed {
        page: u32,
        #[source]
        source: FetchError,
    },

    #[error("no data published for {0}")]
    NoDataForDate(NaiveDate),

    #[error("failed writing {}: {source}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl IngestError {
    pub fn malformed(id: Option<String>, reason: impl Into<String>) -> Self {
        IngestError::MalformedRecord {
            id,
            reason: reason.into(),
        }
    }
}
