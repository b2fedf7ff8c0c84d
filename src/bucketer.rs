//! Grouping of canonical articles by UTC calendar day.

use crate::models::CanonicalArticle;
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

/// `YYYYMMDD` key of a day bucket; also the output file's base name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateBucketKey(String);

impl fmt::Display for DateBucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The bucket an article belongs to: the date part of its UTC `created_at`.
pub fn bucket(article: &CanonicalArticle) -> DateBucketKey {
    DateBucketKey(article.created_at.format("%Y%m%d").to_string())
}

/// Per-run accumulator of articles keyed by day.
///
/// Articles keep the order they were pushed in; keys iterate ascending.
#[derive(Debug, Default)]
pub struct DayBuckets {
    buckets: BTreeMap<DateBucketKey, Vec<CanonicalArticle>>,
}

impl DayBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, article: CanonicalArticle) {
        self.buckets
            .entry(bucket(&article))
            .or_default()
            .push(article);
    }

    /// Append every bucket of `other` after the articles already held here.
    pub fn merge(&mut self, other: DayBuckets) {
        for (key, mut articles) in other.buckets {
            self.buckets.entry(key).or_default().append(&mut articles);
        }
    }

    #[cfg(test)]
    pub fn get(&self, key: &DateBucketKey) -> Option<&[CanonicalArticle]> {
        self.buckets.get(key).map(Vec::as_slice)
    }

    pub fn keys(&self) -> impl Iterator<Item = &DateBucketKey> {
        self.buckets.keys()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, DateBucketKey, Vec<CanonicalArticle>> {
        self.buckets.iter()
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Number of articles across all buckets.
    pub fn article_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}
