//! Normalization of raw API articles into canonical records.
//!
//! Three rewrites happen per article:
//!
//! 1. `in_federal_register` becomes a boolean (`"yes"` anywhere, any case).
//! 2. The nested `agencies` list is flattened into a list of agency names
//!    plus a `states` map of country name -> set of state names.
//! 3. A source timestamp is converted to a UTC `created_at`.
//!
//! Where agency, state and country data live inside a record is described by
//! a [`FieldSchema`], so a renamed field in a future API version is a config
//! change instead of a code change.

use crate::error::IngestError;
use crate::models::{CanonicalArticle, RawArticle};
use crate::utils::next_business_day;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use clap::ValueEnum;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, instrument};

/// Field names used to locate agency, state and country data in a record.
///
/// List-valued candidates are tried in order; the first one holding a list
/// wins. The defaults cover both the singular names of the older
/// API (`state`, `country`) and the plural names of the newer one.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FieldSchema {
    pub agencies: String,
    pub agency_name: String,
    pub agency_states: Vec<String>,
    pub agency_countries: Vec<String>,
    /// Name field of a state or country entry.
    pub entry_name: String,
    pub federal_register: String,
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self {
            agencies: "agencies".into(),
            agency_name: "name".into(),
            agency_states: vec!["states".into(), "state".into()],
            agency_countries: vec!["countries".into(), "country".into()],
            entry_name: "name".into(),
            federal_register: "in_federal_register".into(),
        }
    }
}

impl FieldSchema {
    /// Load a schema from a YAML file. Keys left out keep their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, IngestError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            IngestError::Config(format!("cannot read schema {}: {e}", path.display()))
        })?;
        serde_yaml::from_str(&text).map_err(|e| {
            IngestError::Config(format!("invalid schema {}: {e}", path.display()))
        })
    }
}

/// Which source field supplies the canonical publication instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TimestampSource {
    /// `created_at`, with whatever offset the API attached.
    #[default]
    CreatedAt,
    /// Midnight UTC of the `sourced_at` date, moved forward one business day.
    SourcedAtNextBusinessDay,
    /// `latest_update`, usually a bare date.
    LatestUpdate,
}

impl TimestampSource {
    pub fn field(&self) -> &'static str {
        match self {
            TimestampSource::CreatedAt => "created_at",
            TimestampSource::SourcedAtNextBusinessDay => "sourced_at",
            TimestampSource::LatestUpdate => "latest_update",
        }
    }

    /// The UTC instant this policy assigns to a record.
    pub fn instant(&self, raw: &RawArticle) -> Result<DateTime<Utc>, String> {
        let field = self.field();
        let text = match raw.get(field) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim(),
            Some(Value::Null) | None => return Err(format!("missing `{field}`")),
            Some(other) => return Err(format!("`{field}` is not a string: {other}")),
        };

        let instant = match self {
            TimestampSource::CreatedAt => parse_instant(text),
            TimestampSource::SourcedAtNextBusinessDay => {
                leading_date(text).map(|day| midnight_utc(next_business_day(day)))
            }
            TimestampSource::LatestUpdate => {
                parse_instant(text).or_else(|_| leading_date(text).map(midnight_utc))
            }
        };
        instant.map_err(|e| format!("`{field}`: {e}"))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    schema: FieldSchema,
    timestamp: TimestampSource,
    require_agencies: bool,
}

impl Normalizer {
    pub fn new(schema: FieldSchema, timestamp: TimestampSource) -> Self {
        Self {
            schema,
            timestamp,
            require_agencies: false,
        }
    }

    /// Reject articles whose agency list is absent or empty instead of
    /// passing them through with no agencies.
    pub fn require_agencies(mut self, yes: bool) -> Self {
        self.require_agencies = yes;
        self
    }

    /// Normalize one article.
    #[instrument(level = "debug", skip_all, fields(id = ?raw.id()))]
    pub fn normalize(&self, raw: RawArticle) -> Result<CanonicalArticle, IngestError> {
        let id = raw.id();
        let created_at = self
            .timestamp
            .instant(&raw)
            .map_err(|reason| IngestError::malformed(id.clone(), reason))?;
        let in_federal_register = coerce_flag(raw.get(&self.schema.federal_register));
        let (agencies, states) = self
            .flatten_agencies(&raw)
            .map_err(|reason| IngestError::malformed(id.clone(), reason))?;

        let mut extra = raw.0;
        for field in [
            self.schema.federal_register.as_str(),
            self.schema.agencies.as_str(),
            "in_federal_register",
            "agencies",
            "states",
            "created_at",
        ] {
            extra.shift_remove(field);
        }

        debug!(
            agencies = agencies.len(),
            countries = states.len(),
            "Normalized article"
        );
        Ok(CanonicalArticle {
            in_federal_register,
            agencies,
            states,
            created_at: created_at.naive_utc(),
            extra,
        })
    }

    fn flatten_agencies(
        &self,
        raw: &RawArticle,
    ) -> Result<(Vec<String>, BTreeMap<String, BTreeSet<String>>), String> {
        let mut names = Vec::new();
        let mut states: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        let agencies = match raw.get(&self.schema.agencies) {
            Some(Value::Array(list)) if !list.is_empty() => list,
            _ if self.require_agencies => {
                return Err(format!("no `{}` listed", self.schema.agencies));
            }
            _ => return Ok((names, states)),
        };

        for agency in agencies {
            let agency = match agency {
                Value::String(name) => {
                    names.push(name.clone());
                    continue;
                }
                Value::Object(map) => map,
                other => return Err(format!("unexpected agency entry: {other}")),
            };

            match agency.get(&self.schema.agency_name) {
                Some(Value::String(name)) => names.push(name.clone()),
                _ => return Err(format!("agency without `{}`", self.schema.agency_name)),
            }

            let agency_states = self.entry_names(first_list(agency, &self.schema.agency_states));
            if agency_states.is_empty() {
                continue;
            }
            for country in self.entry_names(first_list(agency, &self.schema.agency_countries)) {
                states
                    .entry(country)
                    .or_default()
                    .extend(agency_states.iter().cloned());
            }
        }

        Ok((names, states))
    }

    fn entry_names(&self, list: Option<&Vec<Value>>) -> Vec<String> {
        list.into_iter()
            .flatten()
            .filter_map(|entry| match entry {
                Value::String(s) => Some(s.clone()),
                Value::Object(map) => match map.get(&self.schema.entry_name) {
                    Some(Value::String(s)) => Some(s.clone()),
                    _ => None,
                },
                _ => None,
            })
            .collect()
    }
}

fn first_list<'a>(
    map: &'a serde_json::Map<String, Value>,
    candidates: &[String],
) -> Option<&'a Vec<Value>> {
    candidates
        .iter()
        .find_map(|field| match map.get(field) {
            Some(Value::Array(list)) => Some(list),
            _ => None,
        })
}

/// `true` when the value is a boolean `true` or text containing "yes".
pub fn coerce_flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.to_lowercase().contains("yes"),
        _ => false,
    }
}

const LOCAL_TIME: &str = r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?";
const UTC_OFFSET: &str = r"Z|[+-]\d{2}:?\d{2}";

// Time part followed by `Z`, `+HH:MM` or `+HHMM`.
static OFFSET: Lazy<Regex> = Lazy::new(|| {
    let pattern = format!("^(?P<local>{LOCAL_TIME})(?P<offset>{UTC_OFFSET})$");
    Regex::new(&pattern).expect("offset pattern is valid")
});

/// Parse an ISO-like timestamp into UTC.
///
/// Colon (`-04:00`) and compact (`-0400`) offsets and `Z` are accepted.
/// A timestamp with no offset at all is already UTC.
pub fn parse_instant(text: &str) -> Result<DateTime<Utc>, String> {
    if let Some(caps) = OFFSET.captures(text) {
        let local = caps["local"].replacen(' ', "T", 1);
        let offset = match &caps["offset"] {
            "Z" => "+0000".to_string(),
            o => o.replace(':', ""),
        };
        let compact = format!("{local}{offset}");
        return DateTime::parse_from_str(&compact, "%Y-%m-%dT%H:%M:%S%.f%z")
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| format!("`{text}` is not a valid timestamp: {e}"));
    }

    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|ts| ts.and_utc())
        .map_err(|e| format!("`{text}` is not a valid timestamp: {e}"))
}

fn midnight_utc(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

pub fn leading_date(text: &str) -> Result<NaiveDate, String> {
    text.get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .ok_or_else(|| format!("`{text}` does not start with a YYYY-MM-DD date"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::canonical_timestamp;
    use serde_json::json;

    fn raw(v: Value) -> RawArticle {
        RawArticle::from(v)
    }

    fn article_with(agencies: Value) -> RawArticle {
        raw(json!({
            "id": "1",
            "in_federal_register": "No",
            "created_at": "2022-07-14T12:00:00.000+00:00",
            "agencies": agencies,
        }))
    }

    fn normalize(raw: RawArticle) -> Result<CanonicalArticle, IngestError> {
        Normalizer::default().normalize(raw)
    }

    fn malformed_id(err: IngestError) -> Option<String> {
        match err {
            IngestError::MalformedRecord { id, .. } => id,
            other => panic!("expected a malformed record, got {other}"),
        }
    }

    fn states_of(a: &CanonicalArticle, country: &str) -> Vec<String> {
        a.states[country].iter().cloned().collect()
    }

    fn rendered(text: &str) -> String {
        let ts = parse_instant(text).unwrap();
        canonical_timestamp::render(&ts.naive_utc())
    }

    #[test]
    fn federal_register_flag_matches_yes_in_any_case() {
        for text in ["Yes", "yes", "YES", "Yes - Final Rule", "maybe yEs"] {
            assert!(coerce_flag(Some(&json!(text))), "{text}");
        }
        for v in [json!("No"), json!(""), json!("n/a"), Value::Null, json!(1)] {
            assert!(!coerce_flag(Some(&v)), "{v}");
        }
        assert!(!coerce_flag(None));
        assert!(coerce_flag(Some(&json!(true))));
        assert!(!coerce_flag(Some(&json!(false))));
    }

    #[test]
    fn absent_flag_normalizes_to_false() {
        let a = normalize(raw(json!({"created_at": "2022-07-14T12:00:00+00:00"}))).unwrap();
        assert!(!a.in_federal_register);
    }

    #[test]
    fn agencies_flatten_into_country_state_sets() {
        let agencies = json!([
            {
                "name": "Iowa Department of Human Services",
                "state": [{"name": "Iowa"}],
                "country": [{"name": "United States"}]
            },
            {
                "name": "Multi-state Board",
                "states": [{"name": "Ohio"}, {"name": "Iowa"}],
                "countries": [{"name": "United States"}, {"name": "Canada"}]
            },
            {
                "name": "Iowa Department of Human Services",
                "state": [{"name": "Iowa"}],
                "country": [{"name": "United States"}]
            }
        ]);
        let a = normalize(article_with(agencies)).unwrap();

        assert_eq!(
            a.agencies,
            vec![
                "Iowa Department of Human Services",
                "Multi-state Board",
                "Iowa Department of Human Services",
            ]
        );
        assert_eq!(states_of(&a, "United States"), vec!["Iowa", "Ohio"]);
        assert_eq!(states_of(&a, "Canada"), vec!["Iowa", "Ohio"]);
        assert_eq!(a.states.len(), 2);
    }

    #[test]
    fn agency_missing_states_or_countries_contributes_nothing() {
        let agencies = json!([
            {"name": "Federal Reserve", "country": [{"name": "United States"}]},
            {"name": "Orphan", "state": [{"name": "Texas"}]},
            {"name": "Nulls", "state": null, "country": null},
            {"name": "Empty", "state": [], "country": [{"name": "Mexico"}]}
        ]);
        let a = normalize(article_with(agencies)).unwrap();

        assert_eq!(a.agencies.len(), 4);
        assert!(a.states.is_empty());
    }

    #[test]
    fn bare_string_entries_are_accepted() {
        let agencies = json!([
            "Iowa House of Representatives",
            {"name": "State Board", "states": ["Utah"], "countries": ["United States"]}
        ]);
        let a = normalize(article_with(agencies)).unwrap();

        assert_eq!(
            a.agencies,
            vec!["Iowa House of Representatives", "State Board"]
        );
        assert_eq!(states_of(&a, "United States"), vec!["Utah"]);
    }

    #[test]
    fn agency_without_name_is_malformed() {
        let agencies = json!([{"state": [{"name": "Iowa"}]}]);
        let err = normalize(article_with(agencies)).unwrap_err();
        assert_eq!(malformed_id(err), Some("1".into()));
    }

    #[test]
    fn missing_agency_list_passes_through_unless_required() {
        let input = raw(json!({
            "created_at": "2022-07-14T12:00:00+00:00",
            "agencies": null
        }));

        let a = normalize(input.clone()).unwrap();
        assert!(a.agencies.is_empty());
        assert!(a.states.is_empty());

        let strict = Normalizer::default().require_agencies(true);
        let err = strict.normalize(input).unwrap_err();
        assert_eq!(malformed_id(err), None);
        let err = strict.normalize(article_with(json!([]))).unwrap_err();
        assert_eq!(malformed_id(err), Some("1".into()));
    }

    #[test]
    fn custom_schema_locates_renamed_fields() {
        let yaml = "agencies: regulators\n\
                    agency_states: [jurisdictions]\n\
                    agency_countries: [nations]\n\
                    entry_name: label\n";
        let schema: FieldSchema = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(schema.agency_name, "name");

        let record = json!({
            "created_at": "2022-07-14T12:00:00+00:00",
            "regulators": [{
                "name": "Bank of Canada",
                "jurisdictions": [{"label": "Ontario"}],
                "nations": [{"label": "Canada"}]
            }]
        });
        let a = Normalizer::new(schema, TimestampSource::CreatedAt)
            .normalize(raw(record))
            .unwrap();

        assert_eq!(a.agencies, vec!["Bank of Canada"]);
        assert_eq!(states_of(&a, "Canada"), vec!["Ontario"]);
        assert!(!a.extra.contains_key("regulators"));
    }

    #[test]
    fn offset_notations_normalize_to_the_same_instant() {
        let expected = "2022-07-15T03:30:00.000000";
        for text in [
            "2022-07-14T23:30:00.000-04:00",
            "2022-07-14T23:30:00.000-0400",
            "2022-07-15T03:30:00.000+00:00",
            "2022-07-15T03:30:00Z",
            "2022-07-15T07:30:00+04:00",
            "2022-07-15T03:30:00",
        ] {
            assert_eq!(rendered(text), expected, "{text}");
        }
    }

    #[test]
    fn microseconds_are_kept_padded_and_truncated() {
        assert_eq!(
            rendered("2024-02-12T22:31:40.567008"),
            "2024-02-12T22:31:40.567008"
        );
        assert_eq!(
            rendered("2024-02-12T22:31:40.5+00:00"),
            "2024-02-12T22:31:40.500000"
        );
        assert_eq!(
            rendered("2022-07-14T23:30:00.1234567-04:00"),
            "2022-07-15T03:30:00.123456"
        );
        assert_eq!(
            rendered("2022-07-14T23:30:00.987654321Z"),
            "2022-07-14T23:30:00.987654"
        );
    }

    #[test]
    fn serialized_created_at_drops_sub_microsecond_digits() {
        let record = json!({"created_at": "2022-07-14T23:30:00.1234567-04:00"});
        let a = normalize(raw(record)).unwrap();

        let line = serde_json::to_value(&a).unwrap();
        assert_eq!(line["created_at"], "2022-07-15T03:30:00.123456");
    }

    #[test]
    fn unparseable_timestamp_is_malformed() {
        let bad = [
            json!("yesterday"),
            json!("2022-13-40T00:00:00+00:00"),
            json!(17),
            Value::Null,
        ];
        for created_at in bad {
            let record = json!({"id": 9, "created_at": created_at.clone()});
            let err = normalize(raw(record)).unwrap_err();
            assert_eq!(malformed_id(err), Some("9".into()), "{created_at}");
        }
    }

    #[test]
    fn sourced_at_moves_to_next_business_day() {
        let source = TimestampSource::SourcedAtNextBusinessDay;
        let n = Normalizer::new(FieldSchema::default(), source);
        let friday = raw(json!({"sourced_at": "2021-07-23T18:45:00+00:00"}));
        let a = n.normalize(friday).unwrap();
        assert_eq!(
            canonical_timestamp::render(&a.created_at),
            "2021-07-26T00:00:00.000000"
        );

        let tuesday = raw(json!({"sourced_at": "2021-07-20"}));
        let a = n.normalize(tuesday).unwrap();
        let wednesday = NaiveDate::from_ymd_opt(2021, 7, 21).unwrap();
        assert_eq!(a.created_at.date(), wednesday);
    }

    #[test]
    fn latest_update_accepts_bare_dates() {
        let n = Normalizer::new(FieldSchema::default(), TimestampSource::LatestUpdate);
        let record = json!({"latest_update": "2024-02-12", "created_at": "garbage"});
        let a = n.normalize(raw(record)).unwrap();
        assert_eq!(
            canonical_timestamp::render(&a.created_at),
            "2024-02-12T00:00:00.000000"
        );
    }

    #[test]
    fn other_fields_pass_through_unchanged() {
        let record = json!({
            "id": "42",
            "title": "Proposed Rule",
            "in_federal_register": "Yes",
            "created_at": "2022-07-14T12:00:00.000+00:00",
            "tags": [{"name": "Banking"}],
            "pdf_url": null
        });
        let a = normalize(raw(record)).unwrap();

        assert!(a.in_federal_register);
        let keys: Vec<&str> = a.extra.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["id", "title", "tags", "pdf_url"]);
        assert_eq!(a.extra["tags"], json!([{"name": "Banking"}]));
        assert_eq!(a.extra["pdf_url"], Value::Null);
    }
}
