//! Scrape stage: discover and store new posts for every configured source.
//!
//! Sources are handled one after another. For each one the harvester asks the
//! reconciler for the new entries, fetches up to `scrape_per_source` of them
//! with a random pause after every fetch, and saves whatever was fetched in a
//! single store step once the source is done.
//!
//! A [`FetchOutcome::Retry`] (paywalled or throttled post) gives its slot to
//! the next new entry, so a source still yields its quota when a few posts
//! are gated. [`FetchOutcome::Skip`] just drops the entry.

use crate::config::{Pacing, RunConfig};
use crate::error::StoreError;
use crate::models::{FetchOutcome, IndexEntry, Post};
use crate::reconcile::new_entries;
use crate::scrapers::sitemap::IndexSource;
use crate::scrapers::substack::ContentFetcher;
use crate::store::Store;
use crate::utils::{domain_of, normalize_base};
use rand::{Rng, rng};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Counters for one scrape stage.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HarvestReport {
    pub sources: usize,
    pub new_entries: usize,
    pub fetched: usize,
    pub retried: usize,
    pub skipped: usize,
    pub saved: usize,
}

impl HarvestReport {
    fn absorb(&mut self, other: HarvestReport) {
        self.sources += other.sources;
        self.new_entries += other.new_entries;
        self.fetched += other.fetched;
        self.retried += other.retried;
        self.skipped += other.skipped;
        self.saved += other.saved;
    }
}

fn pause_for(pacing: &Pacing) -> Duration {
    if pacing.max_secs <= 0.0 {
        return Duration::ZERO;
    }
    let secs = rng().random_range(pacing.min_secs..=pacing.max_secs);
    Duration::from_secs_f64(secs.max(0.0))
}

/// Fetch entries in order until `limit` posts are fetched or the entries
/// run out. Each `Retry` extends the target by one.
pub async fn fetch_entries<F: ContentFetcher>(
    fetcher: &F,
    entries: &[IndexEntry],
    domain: &str,
    limit: Option<usize>,
    pacing: &Pacing,
) -> (Vec<Post>, HarvestReport) {
    let mut report = HarvestReport::default();
    let mut posts = Vec::new();
    let mut target = limit.unwrap_or(entries.len()).min(entries.len());

    let mut i = 0;
    while i < target {
        let entry = &entries[i];
        i += 1;

        match fetcher.fetch(&entry.address, domain).await {
            FetchOutcome::Fetched(mut post) => {
                post.date = entry.last_modified;
                debug!(address = %post.address, title = %post.title, "Fetched post");
                posts.push(post);
                report.fetched += 1;
            }
            FetchOutcome::Retry => {
                report.retried += 1;
                if target < entries.len() {
                    target += 1;
                }
                info!(address = %entry.address, %domain, target, "Post unavailable; trying one more entry");
            }
            FetchOutcome::Skip => {
                report.skipped += 1;
                warn!(address = %entry.address, %domain, "Skipped entry");
            }
        }

        let pause = pause_for(pacing);
        if !pause.is_zero() {
            sleep(pause).await;
        }
    }

    (posts, report)
}

/// Reconcile, fetch and save one source.
#[instrument(level = "info", skip(index, fetcher, store, config))]
pub async fn harvest_source<I: IndexSource, F: ContentFetcher>(
    index: &I,
    fetcher: &F,
    store: &mut Store,
    config: &RunConfig,
    source: &str,
) -> Result<HarvestReport, StoreError> {
    let base = normalize_base(source);
    let Some(domain) = domain_of(&base) else {
        warn!(%source, "Source has no usable host; skipping");
        return Ok(HarvestReport::default());
    };

    let entries = new_entries(index, store, &base, &domain, &config.denylist).await?;
    let (posts, mut report) = fetch_entries(
        fetcher,
        &entries,
        &domain,
        config.limits.scrape_per_source,
        &config.pacing,
    )
    .await;

    report.sources = 1;
    report.new_entries = entries.len();
    if !posts.is_empty() {
        report.saved = store.save_items(&posts)?;
    }
    info!(
        %domain,
        new = report.new_entries,
        fetched = report.fetched,
        retried = report.retried,
        skipped = report.skipped,
        "Harvested source"
    );
    Ok(report)
}

/// Run the scrape stage over every configured source.
#[instrument(level = "info", skip_all, fields(sources = config.sources.len()))]
pub async fn harvest<I: IndexSource, F: ContentFetcher>(
    index: &I,
    fetcher: &F,
    store: &mut Store,
    config: &RunConfig,
) -> Result<HarvestReport, StoreError> {
    let t0 = Instant::now();
    let mut total = HarvestReport::default();
    for source in &config.sources {
        let report = harvest_source(index, fetcher, store, config, source).await?;
        total.absorb(report);
    }
    info!(
        saved = total.saved,
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "Scrape stage complete"
    );
    Ok(total)
}
