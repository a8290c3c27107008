//! Markdown rendering of the category bag.
//!
//! ```markdown
//! # Newsletter digest: 2025-05-06 (Morning)
//!
//! - [Go To Market](#go-to-market)
//!
//! ## Go To Market
//!
//! ### [Pricing your product](https://lg.substack.com/p/pricing)
//!
//! *LG*
//!
//! Two sentences about pricing.
//! ```

use crate::models::CategoryBag;
use crate::utils::{slugify_title, title_case, upcase};
use chrono::NaiveDate;
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, instrument};

pub fn report_path(markdown_output_dir: &str, date: NaiveDate, edition: &str) -> PathBuf {
    PathBuf::from(markdown_output_dir).join(format!("{}_{edition}.md", date.format("%Y-%m-%d")))
}

/// Render the report document. Categories appear in sorted order.
pub fn render_report(bag: &CategoryBag, date: NaiveDate, edition: &str) -> String {
    let mut md = format!(
        "# Newsletter digest: {} ({})\n\n",
        date.format("%Y-%m-%d"),
        upcase(edition)
    );

    if bag.is_empty() {
        md.push_str("No new summaries in this edition.\n");
        return md;
    }

    for category in bag.keys() {
        let heading = title_case(category);
        md.push_str(&format!("- [{heading}](#{})\n", slugify_title(&heading)));
    }
    md.push('\n');

    for (category, entries) in bag {
        md.push_str(&format!("## {}\n\n", title_case(category)));
        for entry in entries {
            md.push_str(&format!("### [{}]({})\n\n", upcase(&entry.title), entry.url));
            md.push_str(&format!("*{}*\n\n", entry.domain.to_uppercase()));
            md.push_str(entry.summary.trim());
            md.push_str("\n\n");
        }
    }
    md
}

/// Render and write the report to `{markdown_output_dir}/{date}_{edition}.md`.
#[instrument(level = "info", skip(bag), fields(categories = bag.len()))]
pub async fn write_report(
    bag: &CategoryBag,
    markdown_output_dir: &str,
    date: NaiveDate,
    edition: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    fs::create_dir_all(markdown_output_dir).await?;
    let path = report_path(markdown_output_dir, date, edition);
    fs::write(&path, render_report(bag, date, edition)).await?;
    info!(path = %path.display(), "Wrote Markdown report");
    Ok(path)
}
