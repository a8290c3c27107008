//! Command-line interface definitions for the digest pipeline.
//!
//! Every flag can also come from the environment. Values given here override
//! the YAML run configuration (see [`Cli::apply_overrides`]).

use crate::config::{BackendKind, RunConfig};
use crate::error::ConfigError;
use clap::Parser;

/// Command-line arguments for the newsletter digest.
///
/// # Examples
///
/// ```sh
/// # Scrape new posts and summarize up to 5 of them
/// newsletter_digest -j ./json -m ./markdown --summary-limit 5
///
/// # Summarize only, with a local model
/// newsletter_digest -j ./json -m ./markdown --skip-scrape --backend ollama --model llama3.1
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Output directory for the JSON category bag
    #[arg(short, long, env = "DIGEST_JSON_DIR")]
    pub json_output_dir: String,

    /// Output directory for the Markdown report
    #[arg(short, long, env = "DIGEST_MARKDOWN_DIR")]
    pub markdown_output_dir: String,

    /// Path to the YAML run configuration
    #[arg(short, long, env = "DIGEST_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Path to the SQLite state database
    #[arg(long, env = "DIGEST_DATABASE", default_value = "media_posts.db")]
    pub database: String,

    /// Text-generation backend (openai or ollama)
    #[arg(long, env = "DIGEST_BACKEND")]
    pub backend: Option<BackendKind>,

    /// Model name for the selected backend
    #[arg(long, env = "DIGEST_MODEL")]
    pub model: Option<String>,

    /// Maximum new posts fetched per source
    #[arg(long)]
    pub scrape_limit: Option<usize>,

    /// Maximum posts summarized in this run
    #[arg(long)]
    pub summary_limit: Option<usize>,

    /// Do not look for new posts
    #[arg(long)]
    pub skip_scrape: bool,

    /// Do not summarize stored posts
    #[arg(long)]
    pub skip_summarize: bool,

    /// Credential for the OpenAI backend
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,
}

impl Cli {
    /// Apply flag values on top of the loaded configuration and re-validate.
    pub fn apply_overrides(&self, config: &mut RunConfig) -> Result<(), ConfigError> {
        if let Some(backend) = self.backend {
            config.generation.backend = backend;
        }
        if let Some(model) = &self.model {
            config.generation.model = Some(model.clone());
        }
        if let Some(limit) = self.scrape_limit {
            config.limits.scrape_per_source = Some(limit);
        }
        if let Some(limit) = self.summary_limit {
            config.limits.summaries = Some(limit);
        }
        config.validate()
    }
}
