//! OpenAI-compatible chat completions backend.
//!
//! Sends `POST {base_url}/chat/completions` with a bearer credential and
//! reports `usage.total_tokens` so the extraction engine can meter calls
//! against the per-minute quota.

use super::{Generation, GenerationBackend, check_status, http_client};
use crate::error::BackendError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, instrument};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";

pub struct OpenAiBackend {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: u64,
}

impl OpenAiBackend {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: http_client()?,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn messages<'a>(prompt: &'a str, system_prompt: Option<&'a str>) -> Vec<Message<'a>> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system_prompt.filter(|s| !s.is_empty()) {
        messages.push(Message {
            role: "system",
            content: system,
        });
    }
    messages.push(Message {
        role: "user",
        content: prompt,
    });
    messages
}

fn into_generation(body: ChatResponse) -> Result<Generation, BackendError> {
    let choice = body.choices.into_iter().next().ok_or(BackendError::EmptyResponse)?;
    Ok(Generation {
        content: choice.message.content.unwrap_or_default(),
        tokens_used: body.usage.map(|u| u.total_tokens),
    })
}

impl GenerationBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Generation, BackendError> {
        let t0 = Instant::now();
        let request = ChatRequest {
            model: &self.model,
            messages: messages(prompt, system_prompt),
            temperature,
            max_tokens,
        };

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let body: ChatResponse = check_status(resp).await?.json().await?;
        let generation = into_generation(body)?;

        info!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            tokens_used = ?generation.tokens_used,
            "Generated completion with OpenAI"
        );
        debug!(content = %crate::utils::truncate_for_log(&generation.content, 300), "OpenAI completion");
        Ok(generation)
    }
}
