//! Delta between a source's sitemap and the store.
//!
//! An entry is new when its address is advertised by the source, its last
//! path segment is not denylisted, and the store has never recorded it for
//! that domain (processed or not). A source whose index cannot be read
//! contributes nothing; the run moves on to the next source.

use crate::error::StoreError;
use crate::models::IndexEntry;
use crate::scrapers::sitemap::IndexSource;
use crate::store::Store;
use crate::utils::last_path_segment;
use tracing::{info, instrument, warn};

/// True when the address ends in one of the denylisted path segments.
pub fn is_denylisted(address: &str, denylist: &[String]) -> bool {
    last_path_segment(address)
        .map(|leaf| denylist.iter().any(|d| d.eq_ignore_ascii_case(&leaf)))
        .unwrap_or(false)
}

/// Entries of `base`'s index that are neither denylisted nor already stored.
///
/// Index order is preserved. Only store failures are returned as errors.
#[instrument(level = "info", skip(index, store, denylist))]
pub async fn new_entries<I: IndexSource>(
    index: &I,
    store: &Store,
    base: &str,
    domain: &str,
    denylist: &[String],
) -> Result<Vec<IndexEntry>, StoreError> {
    let entries = match index.index(base).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(%base, %domain, error = %e, "Source index unavailable; no new items");
            return Ok(Vec::new());
        }
    };
    let advertised = entries.len();

    let known = store.existing_addresses(domain)?;
    let fresh: Vec<IndexEntry> = entries
        .into_iter()
        .filter(|e| !is_denylisted(&e.address, denylist))
        .filter(|e| !known.contains(&e.address))
        .collect();

    info!(advertised, known = known.len(), new = fresh.len(), "Reconciled source");
    Ok(fresh)
}
