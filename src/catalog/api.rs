//! JSON API backend: `GET {base}/{resource}_{property}/{value}` with a
//! `{results, errors}` envelope.

use async_trait::async_trait;
use tracing::debug;

use super::http::HttpClient;
use super::{records_from_envelope, CatalogBackend, Query, ShootRecord};
use crate::config::CatalogConfig;

pub struct ApiCatalog {
    name: String,
    api_url: String,
    http: HttpClient,
}

impl ApiCatalog {
    pub fn new(cfg: &CatalogConfig) -> Self {
        Self {
            name: cfg.name.clone(),
            api_url: cfg.api_url.trim_end_matches('/').to_string(),
            http: HttpClient::new(cfg),
        }
    }

    fn endpoint(&self, query: &Query) -> String {
        match query {
            Query::ById(shoot_id) => format!("{}/shoot/{}", self.api_url, shoot_id),
            Query::ByDate(date) => {
                format!("{}/shoot_date/{}", self.api_url, date.format("%Y-%m-%d"))
            }
            Query::ByTitle(title) => {
                format!("{}/shoot_title/{}", self.api_url, urlencoding::encode(title))
            }
            Query::ByPerformer(name) => {
                format!("{}/model/{}", self.api_url, urlencoding::encode(name))
            }
        }
    }

    /// One-time bulk dump endpoints used by the cache backend.
    pub(crate) async fn dump(&self, resource: &str) -> Vec<serde_json::Value> {
        let url = format!("{}/dump_{}", self.api_url, resource);
        let Some(envelope) = self.http.get_json(&url).await else {
            debug!("Bulk dump of {} failed", resource);
            return Vec::new();
        };
        envelope["results"].as_array().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl CatalogBackend for ApiCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, query: &Query) -> Vec<ShootRecord> {
        let url = self.endpoint(query);
        let Some(envelope) = self.http.get_json(&url).await else {
            return Vec::new();
        };
        records_from_envelope(&envelope)
    }

    async fn site_names(&self) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn catalog() -> ApiCatalog {
        ApiCatalog::new(&CatalogConfig::default())
    }

    #[test]
    fn test_endpoints() {
        let api = catalog();
        assert_eq!(
            api.endpoint(&Query::ById(7675)),
            "https://www.kinkyapi.site/kinkcom/shoot/7675"
        );
        assert_eq!(
            api.endpoint(&Query::ByDate(NaiveDate::from_ymd_opt(2009, 12, 17).unwrap())),
            "https://www.kinkyapi.site/kinkcom/shoot_date/2009-12-17"
        );
        assert_eq!(
            api.endpoint(&Query::ByTitle("Whatever It Takes".to_string())),
            "https://www.kinkyapi.site/kinkcom/shoot_title/Whatever%20It%20Takes"
        );
    }
}
