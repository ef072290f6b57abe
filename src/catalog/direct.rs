//! Direct site scraping backend: fetch the shoot page and pull the
//! structured fields out of known markup regions.

use async_trait::async_trait;
use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};
use tokio::sync::OnceCell;
use tracing::{error, warn};

use super::http::HttpClient;
use super::{CatalogBackend, Query, ShootRecord};
use crate::config::CatalogConfig;

pub struct DirectCatalog {
    name: String,
    base_url: String,
    http: HttpClient,
    site_names: OnceCell<Vec<String>>,
}

impl DirectCatalog {
    pub fn new(cfg: &CatalogConfig) -> Self {
        Self {
            name: cfg.name.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            http: HttpClient::new(cfg),
            site_names: OnceCell::new(),
        }
    }

    async fn query_id(&self, shoot_id: u64) -> Vec<ShootRecord> {
        if shoot_id == 0 {
            return Vec::new();
        }

        let url = format!("{}/shoot/{}", self.base_url, shoot_id);
        let Some(body) = self.http.get_text(&url).await else {
            error!("Could not connect to site for shoot {}", shoot_id);
            return Vec::new();
        };

        vec![parse_shoot_page(&body, shoot_id)]
    }

    /// Site names from the channel footer, plus their acronyms. Fetched
    /// once per process.
    async fn fetch_site_names(&self) -> Vec<String> {
        let url = format!("{}/channels", self.base_url);
        let Some(body) = self.http.get_text(&url).await else {
            warn!("Could not fetch the channel list from {}", url);
            return Vec::new();
        };
        parse_channel_footer(&body)
    }
}

#[async_trait]
impl CatalogBackend for DirectCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, query: &Query) -> Vec<ShootRecord> {
        match query {
            Query::ById(shoot_id) => self.query_id(*shoot_id).await,
            _ => {
                warn!("The direct backend can only resolve shoot IDs, not {:?}", query);
                Vec::new()
            }
        }
    }

    async fn site_names(&self) -> Vec<String> {
        self.site_names
            .get_or_init(|| self.fetch_site_names())
            .await
            .clone()
    }
}

/// Parse one shoot page. A page without a title element means the ID
/// does not exist; each field parses independently and is omitted on
/// failure, with a warning.
fn parse_shoot_page(body: &str, shoot_id: u64) -> ShootRecord {
    let document = Html::parse_document(body);
    let mut record = ShootRecord::missing(shoot_id);

    let page_title = Selector::parse("title")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .map(|el| el.text().collect::<String>())
        .unwrap_or_default();
    if page_title.trim().is_empty() {
        error!("404! No shoot with id {}", shoot_id);
        return record;
    }
    record.exists = true;

    match parse_site(&document) {
        Some(site) => record.site = Some(site),
        None => warn!("Could not parse the site name for shoot {}", shoot_id),
    }

    match parse_title(&document) {
        Some(title) => record.title = Some(title),
        None => warn!("Could not parse the title for shoot {}", shoot_id),
    }

    match parse_performers(&document) {
        Some(performers) if !performers.is_empty() => record.performers = performers,
        _ => warn!("Could not parse the performers for shoot {}", shoot_id),
    }

    match parse_date(&document) {
        Some(date) => record.date = Some(date),
        None => warn!("Could not parse the date for shoot {}", shoot_id),
    }

    record
}

/// The shoot logo links to the site; the verbose name comes from the
/// footer site list entry with the same href.
fn parse_site(document: &Html) -> Option<String> {
    let logo_selector = Selector::parse("div.shoot-logo a").ok()?;
    let site_link = document
        .select(&logo_selector)
        .next()?
        .value()
        .attr("href")?
        .to_string();

    let footer_selector = Selector::parse("div.site-footer a").ok()?;
    document
        .select(&footer_selector)
        .find(|a| a.value().attr("href") == Some(site_link.as_str()))
        .map(|a| a.text().collect::<String>().trim().to_string())
        .filter(|name| !name.is_empty())
}

fn parse_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("div.shoot-info .shoot-title").ok()?;
    let element = document.select(&selector).next()?;
    // Line breaks inside the title become separators
    let title = element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" - ")
        .replace("  ", " ");
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

fn parse_performers(document: &Html) -> Option<Vec<String>> {
    let selector = Selector::parse("div.shoot-info .starring a").ok()?;
    Some(
        document
            .select(&selector)
            .map(|a| a.text().collect::<String>().trim().to_string())
            .filter(|name| !name.is_empty())
            .collect(),
    )
}

/// The date is rendered as a localized long date after a label, e.g.
/// `Date: December 17, 2009`.
fn parse_date(document: &Html) -> Option<NaiveDate> {
    let selector = Selector::parse("div.shoot-info p").ok()?;
    let text = document
        .select(&selector)
        .next()?
        .text()
        .collect::<String>();
    let date_str = text.rsplit(':').next()?.trim();
    NaiveDate::parse_from_str(date_str, "%B %d, %Y").ok()
}

/// Channel names from the footer site lists, each with an acronym of
/// its initials for short-form directory names.
fn parse_channel_footer(body: &str) -> Vec<String> {
    let document = Html::parse_document(body);
    let Ok(selector) = Selector::parse("div#footer div.site-list a") else {
        return Vec::new();
    };

    let mut names = Vec::new();
    for anchor in document.select(&selector) {
        if !anchor
            .value()
            .attr("href")
            .map_or(false, |href| href.starts_with("/channel/"))
        {
            continue;
        }
        let name = element_text(&anchor);
        if name.is_empty() {
            continue;
        }
        let acronym: String = name
            .split_whitespace()
            .filter_map(|word| word.chars().next())
            .collect();
        names.push(name);
        names.push(acronym);
    }
    names
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHOOT_PAGE: &str = r#"
        <html><head><title>Whatever It Takes</title></head><body>
        <div class="column shoot-logo"><a href="/channel/devicebondage"><img/></a></div>
        <div class="shoot-info">
            <h1 class="shoot-title">Whatever It Takes</h1>
            <p>Date: December 17, 2009</p>
            <div class="starring"><a>Holly Heart</a></div>
        </div>
        <div class="site-footer">
            <a href="/channel/hogtied">Hogtied</a>
            <a href="/channel/devicebondage">Device Bondage</a>
        </div>
        </body></html>"#;

    #[test]
    fn test_parse_known_shoot_page() {
        let record = parse_shoot_page(SHOOT_PAGE, 7675);
        assert!(record.exists);
        assert_eq!(record.shoot_id, 7675);
        assert_eq!(record.site.as_deref(), Some("Device Bondage"));
        assert_eq!(record.title.as_deref(), Some("Whatever It Takes"));
        assert_eq!(record.performers, vec!["Holly Heart"]);
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2009, 12, 17));
    }

    #[test]
    fn test_missing_title_element_means_not_found() {
        let record = parse_shoot_page("<html><head><title></title></head><body></body></html>", 1);
        assert!(!record.exists);
        assert_eq!(record.shoot_id, 1);
    }

    #[test]
    fn test_field_failures_are_not_fatal() {
        // Page exists but carries none of the expected regions
        let record =
            parse_shoot_page("<html><head><title>Somewhere</title></head><body></body></html>", 2);
        assert!(record.exists);
        assert!(record.site.is_none());
        assert!(record.title.is_none());
        assert!(record.performers.is_empty());
        assert!(record.date.is_none());
    }

    #[test]
    fn test_parse_channel_footer() {
        let body = r#"
            <html><body><div id="footer">
            <div class="site-list">
                <a href="/channel/devicebondage">Device Bondage</a>
                <a href="/join">Join</a>
            </div>
            </div></body></html>"#;
        let names = parse_channel_footer(body);
        assert_eq!(names, vec!["Device Bondage".to_string(), "DB".to_string()]);
    }
}
