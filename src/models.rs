//! Data models shared across the harvesting and summarization stages.
//!
//! - [`IndexEntry`]: one address advertised by a source's sitemap
//! - [`Post`]: a fetched article ready to be stored
//! - [`Item`]: a stored article together with its bookkeeping columns
//! - [`FetchOutcome`]: three-way result of fetching one address
//! - [`Extracted`] / [`SummaryRecord`]: what the LLM produced for an item
//! - [`CategoryBag`]: the grouped report view handed to the outputs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Origin label written for every stored item.
pub const ORIGIN_SUBSTACK: &str = "Substack";

/// A single `<url>` entry of a source's sitemap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Absolute address of the post.
    pub address: String,
    /// The `<lastmod>` value, when present and parseable.
    pub last_modified: Option<DateTime<Utc>>,
}

/// A post as retrieved from the remote site.
///
/// `date` is filled from the sitemap `lastmod` by the harvester, not from the
/// page itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub domain: String,
    pub address: String,
    pub title: String,
    pub subtitle: String,
    pub like_count: i64,
    pub date: Option<DateTime<Utc>>,
    /// Normalized text body (Markdown-ish header followed by article text).
    pub body: String,
}

/// Outcome of fetching one address.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Content retrieved and normalized.
    Fetched(Post),
    /// Transient condition (gated content, throttling); worth another slot.
    Retry,
    /// Permanent skip; the address is not a usable post.
    Skip,
}

/// A row of the `items` table.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub domain: String,
    pub address: String,
    pub title: String,
    pub subtitle: String,
    pub like_count: i64,
    pub date: Option<DateTime<Utc>>,
    pub body: String,
    pub origin: String,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub processed: bool,
}

/// The `summary` and `category` an extraction call produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub summary: String,
    pub category: String,
}

/// An extraction result bound to the identity of the item it describes.
///
/// Identity fields are always copied from the stored [`Item`], never from the
/// model's answer.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRecord {
    pub address: String,
    pub title: String,
    pub subtitle: String,
    pub domain: String,
    pub date: Option<DateTime<Utc>>,
    pub summary: String,
    pub category: String,
}

impl SummaryRecord {
    pub fn from_item(item: &Item, extracted: Extracted) -> Self {
        Self {
            address: item.address.clone(),
            title: item.title.clone(),
            subtitle: item.subtitle.clone(),
            domain: item.domain.clone(),
            date: item.date,
            summary: extracted.summary,
            category: extracted.category,
        }
    }
}

/// One entry of the category bag, in the shape consumed by the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BagEntry {
    pub url: String,
    pub title: String,
    pub domain: String,
    pub summary: String,
}

/// Category label (lower-cased) to the summaries filed under it.
pub type CategoryBag = BTreeMap<String, Vec<BagEntry>>;

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> Item {
        let now = Utc::now();
        Item {
            domain: "alpha".to_string(),
            address: "https://alpha.substack.com/p/one".to_string(),
            title: "One".to_string(),
            subtitle: "First".to_string(),
            like_count: 3,
            date: None,
            body: "# One".to_string(),
            origin: ORIGIN_SUBSTACK.to_string(),
            first_seen: now,
            last_updated: now,
            processed: false,
        }
    }

    #[test]
    fn test_summary_record_takes_identity_from_item() {
        let record = SummaryRecord::from_item(
            &item(),
            Extracted {
                summary: "Short.".to_string(),
                category: "leadership".to_string(),
            },
        );
        assert_eq!(record.address, "https://alpha.substack.com/p/one");
        assert_eq!(record.domain, "alpha");
        assert_eq!(record.subtitle, "First");
        assert_eq!(record.category, "leadership");
    }

    #[test]
    fn test_category_bag_serializes_as_object_of_lists() {
        let mut bag = CategoryBag::new();
        bag.entry("sales".to_string()).or_default().push(BagEntry {
            url: "https://x.test/p/a".to_string(),
            title: "A".to_string(),
            domain: "x".to_string(),
            summary: "S".to_string(),
        });

        let json = serde_json::to_value(&bag).unwrap();
        assert_eq!(json["sales"][0]["url"], "https://x.test/p/a");
        assert_eq!(json["sales"][0]["domain"], "x");
    }
}
