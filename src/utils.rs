//! Utility functions for edition naming, string handling, URLs and the file system.
//!
//! This module provides helper functions used throughout the application:
//! - Time classification for edition naming
//! - String truncation, capitalization and slugification for logs and reports
//! - JSON error detection for handling truncated LLM answers
//! - Source address normalization and domain identifiers
//! - File system validation for output directories

use chrono::{Local, NaiveTime, Timelike};
use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

/// Classify the current local time into morning, afternoon, or evening.
///
/// The time boundaries are:
/// - **Morning**: 00:00 - 08:00
/// - **Afternoon**: 08:00 - 16:00
/// - **Evening**: 16:00 - 24:00
#[instrument]
pub fn time_of_day() -> String {
    let tod = Local::now().time();
    let which = edition_for(tod);
    tracing::debug!(%tod, %which, "Computed time_of_day");
    which.to_string()
}

/// Edition name for a given time of day.
pub fn edition_for(tod: NaiveTime) -> &'static str {
    match tod.hour() {
        0..=7 => "morning",
        8..=15 => "afternoon",
        _ => "evening",
    }
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (on a character boundary) with
/// an ellipsis and a byte count appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// When the model's answer is cut off by the token limit, parsing fails with
/// an EOF error rather than a syntax error.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Convert a title to a URL-friendly slug, used for Markdown anchors.
pub fn slugify_title(title: &str) -> String {
    title
        .to_lowercase()
        .replace(|c: char| !c.is_alphanumeric() && c != ' ' && c != '-', "")
        .replace(' ', "-")
}

/// Capitalize the first character of a string.
pub fn upcase(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
    }
}

/// Capitalize every whitespace-separated word ("go to market" -> "Go To Market").
pub fn title_case(s: &str) -> String {
    s.split_whitespace().map(upcase).collect::<Vec<_>>().join(" ")
}

/// Ensure a source base address ends with `/` so relative joins land under it.
pub fn normalize_base(base: &str) -> String {
    if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    }
}

/// Domain identifier of a source: the first host label that is not `www`.
///
/// `https://www.lennysnewsletter.com/` -> `lennysnewsletter`,
/// `https://lg.substack.com/` -> `lg`.
pub fn domain_of(address: &str) -> Option<String> {
    let url = Url::parse(address).ok()?;
    let host = url.host_str()?;
    host.split('.')
        .find(|label| !label.is_empty() && *label != "www")
        .map(str::to_string)
}

/// Last non-empty path segment of an address (`/p/some-post/` -> `some-post`).
pub fn last_path_segment(address: &str) -> Option<String> {
    let url = Url::parse(address).ok()?;
    url.path_segments()?
        .filter(|s| !s.is_empty())
        .next_back()
        .map(str::to_string)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then creates and deletes a
/// probe file.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        let result = truncate_for_log("ééééé", 3);
        assert!(result.starts_with('é'));
        assert!(result.contains("(+8 bytes)"));
    }

    #[test]
    fn test_slugify_title() {
        assert_eq!(slugify_title("Hello World"), "hello-world");
        assert_eq!(slugify_title("Go To Market!"), "go-to-market");
    }

    #[test]
    fn test_upcase_and_title_case() {
        assert_eq!(upcase("hello"), "Hello");
        assert_eq!(upcase(""), "");
        assert_eq!(title_case("go to market"), "Go To Market");
        assert_eq!(title_case("  data   analysis "), "Data Analysis");
    }

    #[test]
    fn test_edition_boundaries() {
        let t = |h| NaiveTime::from_hms_opt(h, 30, 0).unwrap();
        assert_eq!(edition_for(t(0)), "morning");
        assert_eq!(edition_for(t(7)), "morning");
        assert_eq!(edition_for(t(8)), "afternoon");
        assert_eq!(edition_for(t(15)), "afternoon");
        assert_eq!(edition_for(t(16)), "evening");
        assert_eq!(edition_for(t(23)), "evening");
    }

    #[test]
    fn test_looks_truncated() {
        let result: Result<serde_json::Value, _> = serde_json::from_str(r#"{"field": "value"#);
        assert!(looks_truncated(&result.unwrap_err()));
        let result: Result<serde_json::Value, _> = serde_json::from_str("nope");
        assert!(!looks_truncated(&result.unwrap_err()));
    }

    #[test]
    fn test_normalize_base() {
        assert_eq!(normalize_base("https://lg.substack.com"), "https://lg.substack.com/");
        assert_eq!(normalize_base("https://lg.substack.com/"), "https://lg.substack.com/");
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(
            domain_of("https://www.lennysnewsletter.com/").as_deref(),
            Some("lennysnewsletter")
        );
        assert_eq!(domain_of("https://lg.substack.com/").as_deref(), Some("lg"));
        assert_eq!(domain_of("https://newsletter.mkt1.co/").as_deref(), Some("newsletter"));
        assert_eq!(domain_of("not a url"), None);
    }

    #[test]
    fn test_last_path_segment() {
        assert_eq!(
            last_path_segment("https://lg.substack.com/p/some-post").as_deref(),
            Some("some-post")
        );
        assert_eq!(
            last_path_segment("https://lg.substack.com/about/").as_deref(),
            Some("about")
        );
        assert_eq!(last_path_segment("https://lg.substack.com/"), None);
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a/b");
        let path = nested.to_str().unwrap();
        ensure_writable_dir(path).await.unwrap();
        assert!(nested.is_dir());
    }
}
