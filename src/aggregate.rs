//! Grouping of a run's summaries into the report's category bag.

use crate::models::{BagEntry, CategoryBag, SummaryRecord};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Phrase models produce when they were handed an empty body.
pub const EMPTY_CONTENT_SENTINEL: &str =
    "Unfortunately, no content was provided to summarize or categorize";

pub fn is_empty_content_summary(summary: &str) -> bool {
    summary.contains(EMPTY_CONTENT_SENTINEL)
}

/// Build the category bag from this run's records.
///
/// Categories are compared lower-cased. Records whose category is not in
/// `allowed` are dropped with a warning, as are summaries carrying the
/// empty-content sentinel. Categories left without entries are not emitted.
pub fn build_category_bag(records: &[SummaryRecord], allowed: &[String]) -> CategoryBag {
    let allowed: HashSet<String> = allowed.iter().map(|c| c.trim().to_lowercase()).collect();
    let mut bag = CategoryBag::new();

    for record in records {
        let category = record.category.trim().to_lowercase();
        if !allowed.contains(&category) {
            warn!(
                category = %record.category,
                domain = %record.domain,
                url = %record.address,
                "Category not in the allowed list; dropping summary"
            );
            continue;
        }
        if is_empty_content_summary(&record.summary) {
            warn!(domain = %record.domain, url = %record.address, "Summary reports empty content; dropping");
            continue;
        }
        bag.entry(category).or_default().push(BagEntry {
            url: record.address.clone(),
            title: record.title.clone(),
            domain: record.domain.clone(),
            summary: record.summary.clone(),
        });
    }

    bag.retain(|_, entries| !entries.is_empty());
    for (category, entries) in &bag {
        debug!(%category, count = entries.len(), "Category filled");
    }
    info!(
        categories = bag.len(),
        entries = bag.values().map(Vec::len).sum::<usize>(),
        "Built category bag"
    );
    bag
}
