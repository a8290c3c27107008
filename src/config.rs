//! Run configuration loaded from a YAML file.
//!
//! Everything that is data rather than behavior lives here: the sources to
//! poll, the allowed categories, prompt templates, generation parameters and
//! the per-run caps. CLI flags may override individual values afterwards (see
//! [`crate::cli::Cli::apply_overrides`]).
//!
//! # Example
//!
//! ```yaml
//! sources:
//!   - https://www.lennysnewsletter.com/
//! categories: [leadership, go to market]
//! generation:
//!   backend: ollama
//!   model: llama3.1
//! limits:
//!   summaries: 5
//! ```

use crate::error::ConfigError;
use itertools::Itertools;
use serde::Deserialize;
use std::fs;
use tracing::{debug, instrument};
use url::Url;

const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert copywriter and journalist. Your task is to write a TL;DR style newsletter by summarizing blog-posts and intrigue the reader to click on the link and read the full article.";

const DEFAULT_USER_PROMPT: &str = "Write a short and engaging summary of the following content in 2 lines. \
Categorize the post into one of the following categories: {categories}. \
Return a structured answer in JSON format with the fields \"summary\" and \"category\". \
If the content is empty or cannot be summarized, return a JSON object with a single \"error\" field describing why.\n\n{body}";

/// Which text-generation backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    OpenAi,
    Ollama,
}

impl std::str::FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(BackendKind::OpenAi),
            "ollama" => Ok(BackendKind::Ollama),
            other => Err(ConfigError::UnsupportedBackend(other.to_string())),
        }
    }
}

/// System and user instruction templates.
///
/// Placeholders: `{categories}`, `{title}`, `{subtitle}`, `{domain}`, `{url}`, `{body}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Prompts {
    pub system: String,
    pub user: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            system: DEFAULT_SYSTEM_PROMPT.to_string(),
            user: DEFAULT_USER_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub backend: BackendKind,
    /// Model name; the backend's default when absent.
    pub model: Option<String>,
    /// API base URL; the backend's default when absent.
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::OpenAi,
            model: None,
            base_url: None,
            temperature: 0.7,
            max_tokens: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Per-minute token quota of the hosted service.
    pub tokens_per_minute: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            tokens_per_minute: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum new posts fetched per source; unbounded when absent.
    pub scrape_per_source: Option<usize>,
    /// Maximum posts sent for summarization per run; unbounded when absent.
    pub summaries: Option<usize>,
    /// Most recent unprocessed posts considered per domain.
    pub per_source_cap: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            scrape_per_source: None,
            summaries: None,
            per_source_cap: 3,
        }
    }
}

/// Random pause between item fetches, in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Pacing {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            min_secs: 2.0,
            max_secs: 5.0,
        }
    }
}

/// Complete run configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub sources: Vec<String>,
    pub categories: Vec<String>,
    #[serde(default = "default_denylist")]
    pub denylist: Vec<String>,
    #[serde(default)]
    pub prompts: Prompts,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub pacing: Pacing,
}

fn default_denylist() -> Vec<String> {
    vec!["about".into(), "archive".into(), "podcast".into()]
}

impl RunConfig {
    /// Read, parse and validate a YAML config file.
    #[instrument(level = "info")]
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let config = Self::from_yaml(&raw).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_string(),
                source,
            },
            other => other,
        })?;
        debug!(
            sources = config.sources.len(),
            categories = %config.categories.iter().join(", "),
            "Loaded run configuration"
        );
        Ok(config)
    }

    /// Parse and validate YAML text.
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::Invalid("at least one source is required".into()));
        }
        for source in &self.sources {
            match Url::parse(source) {
                Ok(u) if matches!(u.scheme(), "http" | "https") && u.host_str().is_some() => {}
                _ => {
                    return Err(ConfigError::Invalid(format!(
                        "source is not an http(s) URL: {source}"
                    )));
                }
            }
        }
        if self.categories.iter().all(|c| c.trim().is_empty()) {
            return Err(ConfigError::Invalid("at least one category is required".into()));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature must be within [0, 2], got {}",
                self.generation.temperature
            )));
        }
        if self.generation.max_tokens == 0 {
            return Err(ConfigError::Invalid("max_tokens must be positive".into()));
        }
        if self.rate_limit.tokens_per_minute == 0 {
            return Err(ConfigError::Invalid("tokens_per_minute must be positive".into()));
        }
        if self.limits.per_source_cap == 0 {
            return Err(ConfigError::Invalid("per_source_cap must be positive".into()));
        }
        if !self.pacing.min_secs.is_finite()
            || !self.pacing.max_secs.is_finite()
            || self.pacing.min_secs < 0.0
            || self.pacing.min_secs > self.pacing.max_secs
        {
            return Err(ConfigError::Invalid(
                "pacing requires 0 <= min_secs <= max_secs".into(),
            ));
        }
        Ok(())
    }
}
