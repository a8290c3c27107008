//! Locally served Ollama backend.
//!
//! Sends `POST {base_url}/generate` and concatenates the `response` field of
//! every line of the streamed NDJSON answer. Ollama is not metered, so
//! `tokens_used` is always `None` and the extraction engine skips rate
//! limiting.

use super::{Generation, GenerationBackend, check_status, http_client};
use crate::error::BackendError;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434/api";
pub const DEFAULT_MODEL: &str = "llama3.1";

#[derive(Debug)]
pub struct OllamaBackend {
    http: reqwest::Client,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    options: GenerateOptions,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    response: String,
}

impl OllamaBackend {
    pub fn new(model: Option<String>, base_url: Option<String>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: http_client()?,
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

/// Join the `response` pieces of an NDJSON stream, skipping unparseable lines.
pub fn join_stream(text: &str) -> String {
    let mut full = String::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match serde_json::from_str::<StreamChunk>(line) {
            Ok(chunk) => full.push_str(&chunk.response),
            Err(e) => warn!(error = %e, line = %crate::utils::truncate_for_log(line, 120), "Failed to parse response chunk"),
        }
    }
    full
}

impl GenerationBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
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
        debug!(system = ?system_prompt, prompt = %crate::utils::truncate_for_log(prompt, 300), "Ollama request");
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            system: system_prompt.unwrap_or(""),
            options: GenerateOptions {
                temperature,
                num_predict: max_tokens,
            },
        };

        let resp = self
            .http
            .post(format!("{}/generate", self.base_url))
            .json(&request)
            .send()
            .await?;
        let text = check_status(resp).await?.text().await?;
        let content = join_stream(&text);

        info!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            bytes = content.len(),
            "Generated completion with Ollama"
        );
        Ok(Generation {
            content,
            tokens_used: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_stream_concatenates_chunks() {
        let text = concat!(
            "{\"model\":\"llama3.1\",\"response\":\"{\\\"summary\\\":\",\"done\":false}\n",
            "{\"model\":\"llama3.1\",\"response\":\" \\\"ok\\\"}\",\"done\":false}\n",
            "{\"model\":\"llama3.1\",\"response\":\"\",\"done\":true}\n",
        );
        assert_eq!(join_stream(text), "{\"summary\": \"ok\"}");
    }

    #[test]
    fn test_join_stream_skips_garbage_lines() {
        let text = "{\"response\":\"a\"}\nnot json\n\n{\"response\":\"b\"}";
        assert_eq!(join_stream(text), "ab");
    }

    #[test]
    fn test_request_uses_options_block() {
        let req = GenerateRequest {
            model: "llama3.1",
            prompt: "p",
            system: "",
            options: GenerateOptions {
                temperature: 0.7,
                num_predict: 500,
            },
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["options"]["num_predict"], 500);
        assert_eq!(json["system"], "");
    }
}
