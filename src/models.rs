//! Data models for RegAlytics articles and the search API envelope.
//!
//! - [`RawArticle`]: one article exactly as the API returned it
//! - [`CanonicalArticle`]: the normalized record written to disk
//! - [`SearchPage`]: one page of a search response
//! - [`QueryWindow`] / [`ProcessingTarget`]: what a run asks the API for
//!
//! Raw records are kept as untyped JSON objects because the API has renamed
//! nested fields several times; only the fields the normalizer rewrites are
//! typed on the canonical side.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A regulatory article as returned by the search API.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(transparent)]
pub struct RawArticle(pub Map<String, Value>);

impl RawArticle {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// The article id rendered as a string, for log and error context.
    ///
    /// v2 of the API returned numeric ids, v3 returns strings.
    pub fn id(&self) -> Option<String> {
        match self.0.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

impl From<Value> for RawArticle {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => RawArticle(map),
            _ => RawArticle::default(),
        }
    }
}

/// An article after normalization.
///
/// The four rewritten fields are typed; everything else the API sent is kept
/// verbatim in `extra`, in source order.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CanonicalArticle {
    pub in_federal_register: bool,
    pub agencies: Vec<String>,
    /// Country name -> state names seen for that country across all agencies.
    pub states: BTreeMap<String, BTreeSet<String>>,
    /// Publication instant in UTC.
    #[serde(with = "canonical_timestamp")]
    pub created_at: NaiveDateTime,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Serde adapter for the on-disk `created_at` format:
/// `YYYY-MM-DDTHH:MM:SS.ffffff`, UTC, no offset suffix.
pub mod canonical_timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

    pub fn render(ts: &NaiveDateTime) -> String {
        ts.format(FORMAT).to_string()
    }

    pub fn serialize<S>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&render(ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f").map_err(serde::de::Error::custom)
    }
}

/// One page of a search response.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchPage {
    pub page_number: u32,
    pub total_pages: u32,
    pub total_results: u64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub results: Vec<RawArticle>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<RawArticle>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let results = Option::<Vec<RawArticle>>::deserialize(deserializer)?;
    Ok(results.unwrap_or_default())
}

/// The date filter of a single search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryWindow {
    /// Inclusive date range; a single day has `start == end`.
    Range { start: NaiveDate, end: NaiveDate },
    /// The whole corpus, no date filter.
    All,
}

impl QueryWindow {
    pub fn day(date: NaiveDate) -> Self {
        QueryWindow::Range {
            start: date,
            end: date,
        }
    }

    pub fn start(&self) -> Option<NaiveDate> {
        match self {
            QueryWindow::Range { start, .. } => Some(*start),
            QueryWindow::All => None,
        }
    }
}

impl fmt::Display for QueryWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryWindow::Range { start, end } if start == end => write!(f, "{start}"),
            QueryWindow::Range { start, end } => write!(f, "{start}..={end}"),
            QueryWindow::All => f.write_str("all"),
        }
    }
}

/// What one invocation processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingTarget {
    Date(NaiveDate),
    Range { start: NaiveDate, end: NaiveDate },
    EntireCorpus,
}

impl ProcessingTarget {
    /// Split the target into the windows the fetcher is called with.
    ///
    /// Ranges are fetched one calendar day at a time, oldest first.
    pub fn windows(&self) -> Vec<QueryWindow> {
        match *self {
            ProcessingTarget::Date(d) => vec![QueryWindow::day(d)],
            ProcessingTarget::Range { start, end } => start
                .iter_days()
                .take_while(|d| *d <= end)
                .map(QueryWindow::day)
                .collect(),
            ProcessingTarget::EntireCorpus => vec![QueryWindow::All],
        }
    }
}
