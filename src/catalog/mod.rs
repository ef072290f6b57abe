//! Catalog lookup: turn a shoot ID (or date/title/performer) into
//! verified scene metadata.
//!
//! Three interchangeable backends answer the same contract: direct site
//! scraping, the JSON API, and a locally cached API dump. Connectivity
//! and parse failures degrade to empty or partial results; "the ID does
//! not exist" is a legitimate outcome carried by `exists`, never an error.

pub mod api;
pub mod cache;
pub mod direct;
pub mod http;

pub use api::ApiCatalog;
pub use cache::CachedCatalog;
pub use direct::DirectCatalog;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

/// One normalized catalog record, the unified shape every backend returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShootRecord {
    #[serde(rename = "shootid")]
    pub shoot_id: u64,
    pub exists: bool,
    pub site: Option<String>,
    pub title: Option<String>,
    pub performers: Vec<String>,
    pub date: Option<NaiveDate>,
}

impl ShootRecord {
    pub fn missing(shoot_id: u64) -> Self {
        Self {
            shoot_id,
            exists: false,
            site: None,
            title: None,
            performers: Vec::new(),
            date: None,
        }
    }
}

/// What to look up. ID queries are exact; textual queries are
/// substring/regex matches on cache scans.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    ById(u64),
    ByDate(NaiveDate),
    ByTitle(String),
    ByPerformer(String),
}

/// A catalog backend. Implementations must satisfy the same contract
/// tests; failures inside a query degrade to an empty result.
#[async_trait]
pub trait CatalogBackend: Send + Sync {
    /// Display name, also matched against storage directory names.
    fn name(&self) -> &str;

    /// Look up records. Connectivity failure after the retry budget and
    /// malformed responses both yield an empty list.
    async fn query(&self, query: &Query) -> Vec<ShootRecord>;

    /// Names of the sites this catalog is responsible for, used for the
    /// directory-to-backend assignment. May be empty when unknown.
    async fn site_names(&self) -> Vec<String>;
}

/// Map one API result object into the unified record shape.
pub(crate) fn record_from_api_result(value: &serde_json::Value) -> ShootRecord {
    ShootRecord {
        shoot_id: value["shootid"]
            .as_u64()
            .or_else(|| value["shootid"].as_str().and_then(|s| s.parse().ok()))
            .unwrap_or(0),
        exists: value["exists"].as_bool().unwrap_or(false),
        site: value["site"]["name"].as_str().map(str::to_string),
        title: value["title"].as_str().map(str::to_string),
        performers: value["performers"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|p| p["name"].as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        date: value["date"]
            .as_i64()
            .or_else(|| value["date"].as_str().and_then(|s| s.parse().ok()))
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.date_naive()),
    }
}

/// Unpack a `{results, errors}` envelope; a truthy `errors` key (or a
/// missing one) means the query produced nothing.
pub(crate) fn records_from_envelope(value: &serde_json::Value) -> Vec<ShootRecord> {
    let Some(errors) = value.get("errors") else {
        return Vec::new();
    };
    if is_truthy(errors) {
        return Vec::new();
    }

    value["results"]
        .as_array()
        .map(|arr| arr.iter().map(record_from_api_result).collect())
        .unwrap_or_default()
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_normalization() {
        let value = json!({
            "shootid": 7675,
            "exists": true,
            "site": {"name": "Device Bondage"},
            "title": "Whatever It Takes",
            "performers": [{"name": "Holly Heart"}],
            "date": 1261008000,
        });
        let record = record_from_api_result(&value);
        assert_eq!(record.shoot_id, 7675);
        assert!(record.exists);
        assert_eq!(record.site.as_deref(), Some("Device Bondage"));
        assert_eq!(record.performers, vec!["Holly Heart"]);
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2009, 12, 17));
    }

    #[test]
    fn test_partial_record_keeps_what_it_can() {
        let value = json!({"shootid": "4242", "exists": true});
        let record = record_from_api_result(&value);
        assert_eq!(record.shoot_id, 4242);
        assert!(record.exists);
        assert!(record.site.is_none());
        assert!(record.performers.is_empty());
        assert!(record.date.is_none());
    }

    #[test]
    fn test_envelope_with_errors_yields_nothing() {
        assert!(records_from_envelope(&json!({"errors": "no such shoot", "results": []})).is_empty());
        // A missing errors key is also not trusted
        assert!(records_from_envelope(&json!({"results": [{"shootid": 1}]})).is_empty());
    }

    #[test]
    fn test_envelope_with_falsy_errors_is_unpacked() {
        let envelope = json!({
            "errors": false,
            "results": [{"shootid": 7675, "exists": true}],
        });
        let records = records_from_envelope(&envelope);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].shoot_id, 7675);
    }
}
