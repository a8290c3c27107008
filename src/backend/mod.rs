//! Text-generation backends.
//!
//! Summaries are produced by sending a system and a user instruction to an
//! LLM. Two interchangeable strategies exist:
//!
//! | Backend | Module | Metered | Notes |
//! |---------|--------|---------|-------|
//! | OpenAI-compatible | [`openai`] | yes | Needs `OPENAI_API_KEY`; reports `usage.total_tokens` |
//! | Ollama | [`ollama`] | no | Local server; no token usage is reported |
//!
//! Both implement [`GenerationBackend`]. [`Backend`] picks one at
//! construction time from the run configuration, so the rest of the pipeline
//! never inspects which strategy it talks to.

pub mod ollama;
pub mod openai;

use crate::config::{BackendKind, GenerationConfig};
use crate::error::{BackendError, ConfigError};
use ollama::OllamaBackend;
use openai::OpenAiBackend;
use std::time::Duration;

/// Environment variable holding the hosted backend's credential.
pub const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";

/// One completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    /// Raw text produced by the model.
    pub content: String,
    /// Total tokens billed for the call, when the backend reports it.
    pub tokens_used: Option<u64>,
}

/// A text-generation service.
pub trait GenerationBackend {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Generate a completion for `prompt`, optionally steered by `system_prompt`.
    ///
    /// Fails only on transport problems or a non-success status; a completion
    /// with useless content is still `Ok`.
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Generation, BackendError>;
}

/// The backend selected for this run.
#[derive(Debug)]
pub enum Backend {
    OpenAi(OpenAiBackend),
    Ollama(OllamaBackend),
}

impl Backend {
    /// Build the configured backend.
    ///
    /// `api_key` is only consulted for the hosted backend; a missing key is a
    /// configuration error raised here, before any item is processed.
    pub fn from_config(
        config: &GenerationConfig,
        api_key: Option<String>,
    ) -> Result<Self, ConfigError> {
        match config.backend {
            BackendKind::OpenAi => {
                let api_key = api_key
                    .filter(|k| !k.trim().is_empty())
                    .ok_or(ConfigError::MissingCredential(OPENAI_API_KEY_VAR))?;
                Ok(Backend::OpenAi(OpenAiBackend::new(
                    api_key,
                    config.model.clone(),
                    config.base_url.clone(),
                )?))
            }
            BackendKind::Ollama => Ok(Backend::Ollama(OllamaBackend::new(
                config.model.clone(),
                config.base_url.clone(),
            )?)),
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Backend::OpenAi(b) => b.model(),
            Backend::Ollama(b) => b.model(),
        }
    }
}

impl GenerationBackend for Backend {
    fn name(&self) -> &str {
        match self {
            Backend::OpenAi(b) => b.name(),
            Backend::Ollama(b) => b.name(),
        }
    }

    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Generation, BackendError> {
        match self {
            Backend::OpenAi(b) => b.generate(prompt, system_prompt, temperature, max_tokens).await,
            Backend::Ollama(b) => b.generate(prompt, system_prompt, temperature, max_tokens).await,
        }
    }
}

/// Shared HTTP client settings for both backends.
pub(crate) fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(concat!("newsletter_digest/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(180))
        .build()
}

/// Turn a non-success response into [`BackendError::Status`].
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(BackendError::Status {
        status: status.as_u16(),
        body: crate::utils::truncate_for_log(&body, 300),
    })
}
