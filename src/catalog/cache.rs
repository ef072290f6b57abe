//! Cached backend: bulk-download the catalog once, answer queries from
//! the local snapshot.
//!
//! Population runs on a background worker while the main flow keeps
//! scanning the filesystem. A query that arrives mid-population waits a
//! bounded amount of time; when the wait elapses, the cache is disabled
//! for the rest of the process and every query transparently falls back
//! to the API backend.

use async_trait::async_trait;
use chrono::DateTime;
use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{info, warn};

use super::api::ApiCatalog;
use super::{record_from_api_result, CatalogBackend, Query, ShootRecord};
use crate::config::CatalogConfig;

struct Snapshot {
    shoots: Vec<serde_json::Value>,
    models: Vec<serde_json::Value>,
}

struct CacheState {
    snapshot: RwLock<Option<Snapshot>>,
    populating: AtomicBool,
    disabled: AtomicBool,
}

pub struct CachedCatalog {
    api: Arc<ApiCatalog>,
    fallback: Arc<dyn CatalogBackend>,
    state: Arc<CacheState>,
    wait: Duration,
    poll: Duration,
}

impl CachedCatalog {
    pub fn new(cfg: &CatalogConfig) -> Self {
        let api = Arc::new(ApiCatalog::new(cfg));
        Self::with_fallback_api(cfg, Arc::clone(&api) as Arc<dyn CatalogBackend>, api)
    }

    /// Route fallback queries through an explicit backend instead of
    /// the API the dumps come from.
    pub fn with_fallback(cfg: &CatalogConfig, fallback: Arc<dyn CatalogBackend>) -> Self {
        Self::with_fallback_api(cfg, fallback, Arc::new(ApiCatalog::new(cfg)))
    }

    fn with_fallback_api(
        cfg: &CatalogConfig,
        fallback: Arc<dyn CatalogBackend>,
        api: Arc<ApiCatalog>,
    ) -> Self {
        Self {
            api,
            fallback,
            state: Arc::new(CacheState {
                snapshot: RwLock::new(None),
                populating: AtomicBool::new(false),
                disabled: AtomicBool::new(false),
            }),
            wait: Duration::from_secs(cfg.cache_wait_secs),
            poll: Duration::from_millis(100),
        }
    }

    /// Kick off the one-time bulk download on a background worker.
    /// Idempotent; does nothing once the cache is disabled or populated.
    pub fn start_population(&self) {
        if self.state.disabled.load(Ordering::SeqCst) {
            return;
        }
        if self.state.populating.swap(true, Ordering::SeqCst) {
            return;
        }

        let api = Arc::clone(&self.api);
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            if state.snapshot.read().await.is_some() {
                state.populating.store(false, Ordering::SeqCst);
                return;
            }

            info!("Downloading catalog dump for the local cache...");
            let shoots = api.dump("shoots").await;
            let models = api.dump("models").await;

            if shoots.is_empty() {
                warn!("Cache population failed, disabling the cache");
                state.disabled.store(true, Ordering::SeqCst);
            } else {
                info!(
                    "Catalog cache ready: {} shoots, {} models",
                    shoots.len(),
                    models.len()
                );
                *state.snapshot.write().await = Some(Snapshot { shoots, models });
            }
            state.populating.store(false, Ordering::SeqCst);
        });
    }

    /// Bounded poll-wait for a running population. Returns false when
    /// the cache is unusable; a timed-out wait disables it permanently.
    async fn wait_for_snapshot(&self) -> bool {
        let deadline = Instant::now() + self.wait;
        while self.state.populating.load(Ordering::SeqCst) {
            if Instant::now() >= deadline {
                warn!(
                    "Cache population did not finish within {:?}, \
                     falling back to direct API queries",
                    self.wait
                );
                self.state.disabled.store(true, Ordering::SeqCst);
                return false;
            }
            tokio::time::sleep(self.poll).await;
        }
        !self.state.disabled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogBackend for CachedCatalog {
    fn name(&self) -> &str {
        self.fallback.name()
    }

    async fn query(&self, query: &Query) -> Vec<ShootRecord> {
        if self.state.disabled.load(Ordering::SeqCst) {
            return self.fallback.query(query).await;
        }
        if !self.wait_for_snapshot().await {
            return self.fallback.query(query).await;
        }

        let guard = self.state.snapshot.read().await;
        match guard.as_ref() {
            Some(snapshot) => scan_snapshot(snapshot, query),
            // Population never ran; behave like the plain fallback backend
            None => {
                drop(guard);
                self.fallback.query(query).await
            }
        }
    }

    async fn site_names(&self) -> Vec<String> {
        self.fallback.site_names().await
    }
}

/// Linear scan over the snapshot: exact match for IDs and dates,
/// regex (falling back to substring) for textual properties.
fn scan_snapshot(snapshot: &Snapshot, query: &Query) -> Vec<ShootRecord> {
    match query {
        Query::ById(shoot_id) => snapshot
            .shoots
            .iter()
            .find(|s| s["shootid"].as_u64() == Some(*shoot_id))
            .map(record_from_api_result)
            .into_iter()
            .collect(),

        Query::ByDate(date) => snapshot
            .shoots
            .iter()
            .filter(|s| {
                s["date"]
                    .as_i64()
                    .and_then(|ts| DateTime::from_timestamp(ts, 0))
                    .map_or(false, |dt| dt.date_naive() == *date)
            })
            .map(record_from_api_result)
            .collect(),

        Query::ByTitle(title) => {
            let matcher = text_matcher(title);
            snapshot
                .shoots
                .iter()
                .filter(|s| s["title"].as_str().map_or(false, |t| matcher(t)))
                .map(record_from_api_result)
                .collect()
        }

        Query::ByPerformer(name) => {
            let matcher = text_matcher(name);
            // Resolve the performer through the model dump first so the
            // shoot filter can use exact names.
            let known: Vec<&str> = snapshot
                .models
                .iter()
                .filter_map(|m| m["name"].as_str())
                .filter(|n| matcher(n))
                .collect();

            snapshot
                .shoots
                .iter()
                .filter(|s| {
                    s["performers"].as_array().map_or(false, |performers| {
                        performers.iter().filter_map(|p| p["name"].as_str()).any(|n| {
                            known.contains(&n) || matcher(n)
                        })
                    })
                })
                .map(record_from_api_result)
                .collect()
        }
    }
}

/// Textual properties match by regex when the needle compiles, by
/// case-insensitive substring otherwise.
fn text_matcher(needle: &str) -> impl Fn(&str) -> bool {
    let regex = Regex::new(needle).ok();
    let lowered = needle.to_lowercase();
    move |haystack: &str| match &regex {
        Some(re) => re.is_match(haystack),
        None => haystack.to_lowercase().contains(&lowered),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    struct FixtureBackend {
        records: Vec<ShootRecord>,
    }

    #[async_trait]
    impl CatalogBackend for FixtureBackend {
        fn name(&self) -> &str {
            "Fixture"
        }

        async fn query(&self, query: &Query) -> Vec<ShootRecord> {
            match query {
                Query::ById(id) => self
                    .records
                    .iter()
                    .filter(|r| r.shoot_id == *id)
                    .cloned()
                    .collect(),
                _ => Vec::new(),
            }
        }

        async fn site_names(&self) -> Vec<String> {
            Vec::new()
        }
    }

    fn snapshot() -> Snapshot {
        Snapshot {
            shoots: vec![
                json!({
                    "shootid": 7675,
                    "exists": true,
                    "site": {"name": "Device Bondage"},
                    "title": "Whatever It Takes",
                    "performers": [{"name": "Holly Heart"}],
                    "date": 1261008000,
                }),
                json!({
                    "shootid": 4242,
                    "exists": true,
                    "site": {"name": "Hogtied"},
                    "title": "Rope Work",
                    "performers": [{"name": "Someone Else"}],
                    "date": 1161008000,
                }),
            ],
            models: vec![json!({"name": "Holly Heart"})],
        }
    }

    #[test]
    fn test_scan_by_id_is_exact() {
        let records = scan_snapshot(&snapshot(), &Query::ById(7675));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title.as_deref(), Some("Whatever It Takes"));

        assert!(scan_snapshot(&snapshot(), &Query::ById(1)).is_empty());
    }

    #[test]
    fn test_scan_by_date() {
        let date = NaiveDate::from_ymd_opt(2009, 12, 17).unwrap();
        let records = scan_snapshot(&snapshot(), &Query::ByDate(date));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].shoot_id, 7675);
    }

    #[test]
    fn test_scan_by_title_uses_pattern() {
        let records = scan_snapshot(&snapshot(), &Query::ByTitle("What.*Takes".to_string()));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].shoot_id, 7675);
    }

    #[test]
    fn test_scan_by_performer_via_models() {
        let records = scan_snapshot(&snapshot(), &Query::ByPerformer("Holly".to_string()));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].shoot_id, 7675);
    }

    #[tokio::test]
    async fn test_unusable_cache_answers_exactly_like_its_backend() {
        let record = ShootRecord {
            shoot_id: 7675,
            exists: true,
            site: Some("Device Bondage".to_string()),
            title: Some("Whatever It Takes".to_string()),
            performers: vec!["Holly Heart".to_string()],
            date: NaiveDate::from_ymd_opt(2009, 12, 17),
        };
        let inner = Arc::new(FixtureBackend {
            records: vec![record.clone()],
        });
        let mut cache = CachedCatalog::with_fallback(
            &CatalogConfig::default(),
            Arc::clone(&inner) as Arc<dyn CatalogBackend>,
        );

        // A population that never finishes: the bounded wait elapses
        // inside query() and the backend answers instead
        cache.wait = Duration::from_millis(0);
        cache.state.populating.store(true, Ordering::SeqCst);
        let via_cache = cache.query(&Query::ById(7675)).await;
        assert_eq!(via_cache, inner.query(&Query::ById(7675)).await);
        assert_eq!(via_cache, vec![record]);
        assert!(cache.state.disabled.load(Ordering::SeqCst));

        // Once disabled, every query keeps going straight through
        cache.state.populating.store(false, Ordering::SeqCst);
        assert_eq!(
            cache.query(&Query::ById(1)).await,
            inner.query(&Query::ById(1)).await
        );
    }

    #[tokio::test]
    async fn test_timed_out_wait_disables_the_cache() {
        let mut cache = CachedCatalog::new(&CatalogConfig::default());
        cache.wait = Duration::from_millis(0);
        // Simulate a population that never finishes
        cache.state.populating.store(true, Ordering::SeqCst);

        assert!(!cache.wait_for_snapshot().await);
        assert!(cache.state.disabled.load(Ordering::SeqCst));
        // Subsequent waits stay disabled without blocking
        cache.state.populating.store(false, Ordering::SeqCst);
        assert!(!cache.wait_for_snapshot().await);
    }
}
