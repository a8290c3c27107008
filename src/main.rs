//! # Newsletter Digest
//!
//! An incremental newsletter pipeline: it discovers new posts on Substack
//! publications, stores them in SQLite, has an LLM write a two-line summary
//! and a category for each one, and renders the results as JSON and Markdown.
//!
//! ## Usage
//!
//! ```sh
//! OPENAI_API_KEY=... newsletter_digest -j ./json -m ./markdown
//! ```
//!
//! ## Architecture
//!
//! Every run has two stages, each of which can be skipped:
//! 1. **Scrape**: read each source's sitemap, keep the addresses the store
//!    has never seen, fetch them and save them unprocessed
//! 2. **Summarize**: take the most recent unprocessed posts of every source,
//!    extract a summary for each (rate limited by a token bucket), store the
//!    summaries and mark the posts processed
//!
//! The summaries of the run are grouped by category and written as
//! `{json_dir}/{date}/{edition}.json` and `{markdown_dir}/{date}_{edition}.md`.

use chrono::Local;
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod aggregate;
mod backend;
mod cli;
mod config;
mod decode;
mod error;
mod extract;
mod harvest;
mod models;
mod outputs;
mod pipeline;
mod ratelimit;
mod reconcile;
mod scrapers;
mod store;
mod utils;

use backend::{Backend, GenerationBackend};
use cli::Cli;
use config::RunConfig;
use extract::ExtractionEngine;
use models::CategoryBag;
use outputs::{json, markdown};
use scrapers::sitemap::SitemapIndex;
use scrapers::substack::SubstackFetcher;
use store::Store;
use utils::{ensure_writable_dir, time_of_day};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("newsletter_digest starting up");

    let args = Cli::parse();
    debug!(?args.json_output_dir, ?args.markdown_output_dir, %args.config, %args.database, "Parsed CLI arguments");

    if let Err(e) = run(&args).await {
        error!(error = %e, "Run failed");
        return Err(e);
    }

    info!(
        elapsed_secs = start_time.elapsed().as_secs_f64(),
        "newsletter_digest finished"
    );
    Ok(())
}

async fn run(args: &Cli) -> Result<(), Box<dyn Error>> {
    // --- Configuration; nothing has been touched yet ---
    let mut config = RunConfig::load(&args.config)?;
    args.apply_overrides(&mut config)?;
    info!(
        sources = config.sources.len(),
        categories = config.categories.len(),
        "Loaded configuration"
    );

    let backend = if args.skip_summarize {
        None
    } else {
        let backend = Backend::from_config(&config.generation, args.openai_api_key.clone())?;
        info!(backend = backend.name(), model = backend.model(), "Generation backend ready");
        Some(backend)
    };

    for dir in [&args.json_output_dir, &args.markdown_output_dir] {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(path = %dir, error = %e, "Output directory is not writable (fix perms or choose a different path)");
            return Err(e);
        }
    }

    let mut store = Store::open(&args.database)?;
    let result = run_stages(args, &config, backend, &mut store).await;
    close_store(&mut store, result)
}

/// Shut the store down after the stages. A stage error wins over a
/// shutdown error; the shutdown error is always logged.
fn close_store(
    store: &mut Store,
    result: Result<(), Box<dyn Error>>,
) -> Result<(), Box<dyn Error>> {
    if let Err(e) = store.shutdown() {
        error!(error = %e, "Failed to close the state store");
        if result.is_ok() {
            return Err(e.into());
        }
    }
    result
}

async fn run_stages(
    args: &Cli,
    config: &RunConfig,
    backend: Option<Backend>,
    store: &mut Store,
) -> Result<(), Box<dyn Error>> {
    // ---- Scrape ----
    if args.skip_scrape {
        info!("Skipping scrape stage");
    } else {
        let http = scrapers::http_client()?;
        let index = SitemapIndex::new(http.clone());
        let fetcher = SubstackFetcher::new(http);
        let report = harvest::harvest(&index, &fetcher, store, config).await?;
        info!(
            new = report.new_entries,
            fetched = report.fetched,
            retried = report.retried,
            skipped = report.skipped,
            saved = report.saved,
            "Scrape stage finished"
        );
    }

    // ---- Summarize ----
    let Some(backend) = backend else {
        info!("Skipping summarize stage");
        log_backlog(store)?;
        return Ok(());
    };
    let mut engine = ExtractionEngine::from_config(backend, config);
    let outcome = pipeline::summarize_batch(
        &mut engine,
        store,
        config.limits.per_source_cap,
        config.limits.summaries,
        &config.categories,
    )
    .await?;

    write_outputs(args, &outcome.bag).await;
    log_backlog(store)?;
    Ok(())
}

/// Write the JSON bag and the Markdown report; failures are logged only.
#[instrument(level = "info", skip_all)]
async fn write_outputs(args: &Cli, bag: &CategoryBag) {
    let date = Local::now().date_naive();
    let edition = time_of_day();

    match json::write_category_bag(bag, &args.json_output_dir, date, &edition).await {
        Ok(path) => info!(path = %path.display(), "JSON output written"),
        Err(e) => error!(error = %e, "Failed to write JSON output"),
    }
    match markdown::write_report(bag, &args.markdown_output_dir, date, &edition).await {
        Ok(path) => info!(path = %path.display(), "Markdown output written"),
        Err(e) => error!(error = %e, "Failed writing Markdown"),
    }
}

fn log_backlog(store: &Store) -> Result<(), Box<dyn Error>> {
    for (domain, count) in store.unprocessed_counts()? {
        info!(%domain, unprocessed = count, "Backlog");
    }
    Ok(())
}
