//! Newsletter scrapers.
//!
//! Each source is handled in two phases:
//!
//! 1. **Indexing**: read the publication's `sitemap.xml` to discover post
//!    addresses ([`sitemap`])
//! 2. **Fetching**: download one post and normalize it to text ([`substack`])
//!
//! Both phases sit behind traits ([`sitemap::IndexSource`],
//! [`substack::ContentFetcher`]) so the harvester can be driven by scripted
//! implementations in tests.
//!
//! | Phase | Module | Method | Notes |
//! |-------|--------|--------|-------|
//! | Indexing | [`sitemap`] | XML | `<base>/sitemap.xml`, `loc` + `lastmod` |
//! | Fetching | [`substack`] | HTML scraping | Public content only; paywalled posts are retried |

pub mod sitemap;
pub mod substack;

use std::time::Duration;

/// Shared HTTP client for scraping.
pub fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36")
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .build()
}
