//! Summarize stage: one bounded batch from the store through extraction.
//!
//! # Flow
//!
//! 1. Pick candidates: the most recent unprocessed posts of every domain
//!    (`per_source_cap` each), then at most `summary_limit` of them.
//! 2. Extract each candidate in turn. A successful summary is written to the
//!    store right away (replacing any earlier one for the address). A
//!    rejected answer only drops the post from this run's report.
//! 3. Mark every candidate processed, whatever its extraction outcome.
//! 4. Group the summaries into the [`CategoryBag`].
//!
//! A backend transport error aborts the batch before step 3, so the batch's
//! posts stay unprocessed and are picked again by the next run. Summaries
//! already written are simply replaced then.

use crate::aggregate::build_category_bag;
use crate::backend::GenerationBackend;
use crate::error::{PipelineError, StoreError};
use crate::extract::ExtractionEngine;
use crate::models::{CategoryBag, Item, SummaryRecord};
use crate::store::Store;
use std::time::Instant;
use tracing::{debug, error, info, instrument};

/// Result of one summarize batch.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BatchOutcome {
    /// Posts dispatched for extraction.
    pub candidates: usize,
    /// Posts that produced a stored summary.
    pub summarized: usize,
    /// Posts whose answer was rejected.
    pub rejected: usize,
    /// Rows flipped to processed.
    pub marked: usize,
    pub bag: CategoryBag,
}

/// Batch of unprocessed posts to summarize, in dispatch order.
pub fn select_candidates(
    store: &Store,
    per_source_cap: usize,
    limit: Option<usize>,
) -> Result<Vec<Item>, StoreError> {
    let mut candidates = store.recent_unprocessed_by_domain(per_source_cap)?;
    if let Some(limit) = limit {
        candidates.truncate(limit);
    }
    Ok(candidates)
}

/// Run one summarize batch.
#[instrument(level = "info", skip(engine, store, allowed))]
pub async fn summarize_batch<B: GenerationBackend>(
    engine: &mut ExtractionEngine<B>,
    store: &mut Store,
    per_source_cap: usize,
    limit: Option<usize>,
    allowed: &[String],
) -> Result<BatchOutcome, PipelineError> {
    let t0 = Instant::now();
    let candidates = select_candidates(store, per_source_cap, limit)?;
    info!(count = candidates.len(), "Summarizing candidates");

    let mut records: Vec<SummaryRecord> = Vec::with_capacity(candidates.len());
    for (i, item) in candidates.iter().enumerate() {
        debug!(index = i, address = %item.address, domain = %item.domain, "Dispatching post");
        match engine.summarize(item).await {
            Ok(Some(record)) => {
                store.save_summary(&record)?;
                records.push(record);
            }
            Ok(None) => {}
            Err(e) => {
                error!(
                    address = %item.address,
                    domain = %item.domain,
                    error = %e,
                    "Backend call failed; aborting batch"
                );
                return Err(e.into());
            }
        }
    }

    let addresses: Vec<String> = candidates.iter().map(|c| c.address.clone()).collect();
    let marked = store.mark_processed(&addresses)?;
    let bag = build_category_bag(&records, allowed);

    let outcome = BatchOutcome {
        candidates: candidates.len(),
        summarized: records.len(),
        rejected: candidates.len() - records.len(),
        marked,
        bag,
    };
    info!(
        candidates = outcome.candidates,
        summarized = outcome.summarized,
        rejected = outcome.rejected,
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "Summarize stage complete"
    );
    Ok(outcome)
}
