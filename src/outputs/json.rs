//! JSON output of the category bag.
//!
//! One file per run, grouped by day:
//! ```text
//! json_output_dir/
//! └── 2025-05-06/
//!     ├── morning.json
//!     ├── afternoon.json
//!     └── evening.json
//! ```
//!
//! The document maps each category to its entries:
//! ```json
//! { "leadership": [ { "url": "...", "title": "...", "domain": "...", "summary": "..." } ] }
//! ```

use crate::models::CategoryBag;
use chrono::NaiveDate;
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, instrument};

/// Path of the JSON file for a run.
pub fn bag_path(json_output_dir: &str, date: NaiveDate, edition: &str) -> PathBuf {
    PathBuf::from(json_output_dir)
        .join(date.format("%Y-%m-%d").to_string())
        .join(format!("{edition}.json"))
}

/// Serialize the bag to `{json_output_dir}/{date}/{edition}.json`.
///
/// An existing file for the same edition is overwritten.
#[instrument(level = "info", skip(bag), fields(categories = bag.len()))]
pub async fn write_category_bag(
    bag: &CategoryBag,
    json_output_dir: &str,
    date: NaiveDate,
    edition: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(bag)?;
    let path = bag_path(json_output_dir, date, edition);

    if let Some(dir) = path.parent() {
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create JSON dir");
            return Err(e.into());
        }
    }

    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote category bag");
    Ok(path)
}
