//! Sitemap indexing.
//!
//! Substack publications expose every post in `<base>/sitemap.xml`:
//!
//! ```xml
//! <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
//!   <url>
//!     <loc>https://lg.substack.com/p/some-post</loc>
//!     <lastmod>2024-05-01T10:00:00.000Z</lastmod>
//!   </url>
//! </urlset>
//! ```

use crate::error::SourceError;
use crate::models::IndexEntry;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use itertools::Itertools;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

/// Something that can list a source's advertised posts.
pub trait IndexSource {
    /// Entries of the index for `base` (a normalized base address ending in `/`),
    /// in index order.
    async fn index(&self, base: &str) -> Result<Vec<IndexEntry>, SourceError>;
}

#[derive(Debug, Deserialize)]
struct UrlSet {
    #[serde(rename = "url", default)]
    urls: Vec<UrlElement>,
}

#[derive(Debug, Deserialize)]
struct UrlElement {
    loc: String,
    #[serde(default)]
    lastmod: Option<String>,
}

/// Parse a `lastmod` value: RFC 3339, a naive ISO-8601 date-time (optionally
/// `Z`-suffixed, read as UTC) or a plain date.
pub fn parse_lastmod(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = raw.trim_end_matches('Z');
    if let Ok(dt) = NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Parse sitemap XML into index entries, dropping duplicate addresses.
pub fn parse_sitemap(xml: &str) -> Result<Vec<IndexEntry>, SourceError> {
    let set: UrlSet = quick_xml::de::from_str(xml)?;
    let entries = set
        .urls
        .into_iter()
        .filter_map(|u| {
            let address = u.loc.trim().to_string();
            if address.is_empty() {
                return None;
            }
            let last_modified = u.lastmod.as_deref().and_then(|raw| {
                let parsed = parse_lastmod(raw);
                if parsed.is_none() {
                    warn!(%address, lastmod = raw, "Invalid lastmod date");
                }
                parsed
            });
            Some(IndexEntry {
                address,
                last_modified,
            })
        })
        .unique_by(|e| e.address.clone())
        .collect();
    Ok(entries)
}

/// Any non-success status makes the index unavailable.
pub fn check_index_status(status: StatusCode) -> Result<(), SourceError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(SourceError::Status(status.as_u16()))
    }
}

/// Reads `<base>/sitemap.xml` over HTTP.
#[derive(Debug, Clone)]
pub struct SitemapIndex {
    http: reqwest::Client,
}

impl SitemapIndex {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl IndexSource for SitemapIndex {
    #[instrument(level = "info", skip(self))]
    async fn index(&self, base: &str) -> Result<Vec<IndexEntry>, SourceError> {
        let url = format!("{base}sitemap.xml");
        let resp = self.http.get(&url).send().await?;
        check_index_status(resp.status())?;
        let xml = resp.text().await?;
        let entries = parse_sitemap(&xml)?;
        info!(count = entries.len(), %url, "Indexed sitemap");
        debug!(urls = ?entries.iter().map(|e| &e.address).collect::<Vec<_>>(), "Sitemap URLs");
        Ok(entries)
    }
}
