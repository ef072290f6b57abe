//! Shared HTTP plumbing for the catalog backends: cookie capture, fixed
//! headers, short timeout, and a small retry budget for transient
//! connection problems only.

use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::CatalogConfig;

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    retries: u32,
    backoff: Duration,
}

impl HttpClient {
    /// Build a client for the given catalog. The viewing-preferences
    /// cookie is seeded for the site base URL; everything else the site
    /// sets is captured in the jar.
    pub fn new(cfg: &CatalogConfig) -> Self {
        let jar = Arc::new(Jar::default());
        if let Ok(base) = Url::parse(&cfg.base_url) {
            jar.add_cookie_str("viewing-preferences=straight,gay", &base);
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .default_headers(headers)
            .cookie_provider(jar)
            .user_agent("Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/115.0")
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            retries: cfg.retries,
            backoff: Duration::from_millis(cfg.retry_backoff_ms),
        }
    }

    /// GET a page as text. Timeouts and connection errors are retried up
    /// to the budget with a short backoff; any other error aborts
    /// immediately. Exhaustion and empty bodies both come back as None.
    pub async fn get_text(&self, url: &str) -> Option<String> {
        for attempt in 1..=self.retries {
            match self.client.get(url).send().await {
                Ok(response) => {
                    let body = response.text().await.unwrap_or_default();
                    if body.is_empty() {
                        return None;
                    }
                    return Some(body);
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    debug!(
                        "GET {} failed (attempt {}/{}): {}",
                        url, attempt, self.retries, e
                    );
                    if attempt < self.retries {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
                Err(e) => {
                    debug!("Caught exception \"{}\" while requesting {}", e, url);
                    return None;
                }
            }
        }
        None
    }

    /// GET and decode a JSON body; tolerates malformed bodies as None.
    pub async fn get_json(&self, url: &str) -> Option<serde_json::Value> {
        let body = self.get_text(url).await?;
        match serde_json::from_str(&body) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("Response from {} was not JSON: {}", url, e);
                None
            }
        }
    }
}
