//! Substack post fetcher.
//!
//! Downloads one public post page and normalizes it into a [`Post`] whose
//! body is a short Markdown-style header followed by the article text:
//!
//! ```text
//! # Title
//!
//! ## Subtitle
//!
//! **Mar 4, 2024**
//!
//! **Likes:** 120
//!
//! First paragraph...
//! ```
//!
//! # Outcomes
//!
//! - Paywalled pages (`h2.paywall-title`) and throttled responses (429, 5xx)
//!   are [`FetchOutcome::Retry`]
//! - `about`/`archive` pages, other HTTP errors and pages without an article
//!   body are [`FetchOutcome::Skip`]

use crate::models::{FetchOutcome, Post};
use crate::utils::last_path_segment;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument, warn};

/// Pages that are part of every publication but are not posts.
const NON_POST_PAGES: [&str; 2] = ["about", "archive"];

const BLOCK_TAGS: [&str; 10] = ["p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "blockquote", "pre"];

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("h1.post-title, h2").unwrap());
static SUBTITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("h3.subtitle").unwrap());
static DATE: Lazy<Selector> = Lazy::new(|| Selector::parse(".post-date, time").unwrap());
static LIKES: Lazy<Selector> = Lazy::new(|| Selector::parse("a.post-ufi-button .label").unwrap());
static CONTENT: Lazy<Selector> = Lazy::new(|| Selector::parse("div.available-content").unwrap());
static PAYWALL: Lazy<Selector> = Lazy::new(|| Selector::parse("h2.paywall-title").unwrap());
static BLOCKS: Lazy<Selector> = Lazy::new(|| Selector::parse(&BLOCK_TAGS.join(", ")).unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Retrieves and normalizes a single post.
pub trait ContentFetcher {
    async fn fetch(&self, address: &str, domain: &str) -> FetchOutcome;
}

/// Fetches public Substack posts over HTTP.
#[derive(Debug, Clone)]
pub struct SubstackFetcher {
    http: reqwest::Client,
}

impl SubstackFetcher {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl ContentFetcher for SubstackFetcher {
    #[instrument(level = "info", skip(self), fields(%address, %domain))]
    async fn fetch(&self, address: &str, domain: &str) -> FetchOutcome {
        if let Some(leaf) = last_path_segment(address) {
            if NON_POST_PAGES.contains(&leaf.as_str()) {
                debug!(%address, "Skipping non-post page");
                return FetchOutcome::Skip;
            }
        }

        let resp = match self.http.get(address).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(%address, %domain, error = %e, "Post fetch failed");
                return FetchOutcome::Skip;
            }
        };
        let status = resp.status();
        if let Some(outcome) = outcome_for_status(status) {
            if outcome == FetchOutcome::Retry {
                warn!(%address, %domain, status = status.as_u16(), "Post temporarily unavailable");
            } else {
                warn!(%address, %domain, status = status.as_u16(), "Post returned an error status");
            }
            return outcome;
        }

        match resp.text().await {
            Ok(html) => parse_post(&html, address, domain),
            Err(e) => {
                warn!(%address, %domain, error = %e, "Failed reading post body");
                FetchOutcome::Skip
            }
        }
    }
}

/// Classify a response status. `None` means the body should be parsed.
///
/// Throttling (429) and server errors are worth another slot; any other
/// non-success status skips the address.
pub fn outcome_for_status(status: StatusCode) -> Option<FetchOutcome> {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Some(FetchOutcome::Retry)
    } else if !status.is_success() {
        Some(FetchOutcome::Skip)
    } else {
        None
    }
}

/// Turn a post page into a [`FetchOutcome`].
pub fn parse_post(html: &str, address: &str, domain: &str) -> FetchOutcome {
    let document = Html::parse_document(html);

    if document.select(&PAYWALL).next().is_some() {
        warn!(%address, %domain, "Skipping premium article");
        return FetchOutcome::Retry;
    }

    let Some(content) = document.select(&CONTENT).next() else {
        warn!(%address, %domain, "Page has no article body");
        return FetchOutcome::Skip;
    };

    let title = first_text(&document, &TITLE).unwrap_or_default();
    let subtitle = first_text(&document, &SUBTITLE).unwrap_or_default();
    let date = first_text(&document, &DATE).unwrap_or_else(|| "Date not available".to_string());
    let like_count = first_text(&document, &LIKES)
        .map(|label| parse_like_count(&label))
        .unwrap_or(0);

    let text = content_to_text(content);
    let body = compose_body(&title, &subtitle, &date, like_count, &text);
    info!(bytes = body.len(), "Parsed post");

    FetchOutcome::Fetched(Post {
        domain: domain.to_string(),
        address: address.to_string(),
        title,
        subtitle,
        like_count,
        date: None,
        body,
    })
}

fn collapse(s: &str) -> String {
    WHITESPACE.replace_all(s, " ").trim().to_string()
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .map(|el| collapse(&el.text().collect::<String>()))
        .find(|t| !t.is_empty())
}

/// Digits of a like label ("1,204" -> 1204); 0 when there are none.
pub fn parse_like_count(label: &str) -> i64 {
    let digits: String = label.chars().filter(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

fn is_block(el: &ElementRef<'_>) -> bool {
    BLOCK_TAGS.contains(&el.value().name())
}

/// Text of the article, one block element per paragraph.
///
/// Blocks nested in other blocks (a `p` inside a `blockquote`) are emitted
/// once, through their outermost block.
fn content_to_text(content: ElementRef<'_>) -> String {
    let mut blocks = Vec::new();
    for el in content.select(&BLOCKS) {
        let nested = el
            .ancestors()
            .take_while(|node| node.id() != content.id())
            .filter_map(ElementRef::wrap)
            .any(|a| is_block(&a));
        if nested {
            continue;
        }
        let text = collapse(&el.text().collect::<String>());
        if text.is_empty() {
            continue;
        }
        let line = match el.value().name() {
            "h1" => format!("# {text}"),
            "h2" => format!("## {text}"),
            "h3" | "h4" | "h5" | "h6" => format!("### {text}"),
            "li" => format!("- {text}"),
            "blockquote" => format!("> {text}"),
            _ => text,
        };
        blocks.push(line);
    }

    if blocks.is_empty() {
        collapse(&content.text().collect::<String>())
    } else {
        blocks.join("\n\n")
    }
}

/// Header with the post's metadata followed by its text.
pub fn compose_body(title: &str, subtitle: &str, date: &str, like_count: i64, text: &str) -> String {
    let mut body = format!("# {title}\n\n");
    if !subtitle.is_empty() {
        body.push_str(&format!("## {subtitle}\n\n"));
    }
    body.push_str(&format!("**{date}**\n\n"));
    body.push_str(&format!("**Likes:** {like_count}\n\n"));
    body.push_str(text);
    body
}
