//! Rate-limited structured extraction.
//!
//! [`ExtractionEngine`] turns the normalized body of a stored item into a
//! validated `(summary, category)` pair:
//!
//! 1. Render the system and user instructions from the configured templates.
//! 2. Call the [`GenerationBackend`].
//! 3. Charge the reported token usage to the [`TokenBucket`] (skipped when
//!    the backend does not report usage).
//! 4. Decode the answer with [`decode_answer`].
//!
//! Decode failures are per-item: [`ExtractionEngine::summarize`] logs them
//! and yields `None` so the batch can continue. Transport failures are
//! returned to the caller and abort the run.

use crate::backend::GenerationBackend;
use crate::config::{Prompts, RunConfig};
use crate::decode::decode_answer;
use crate::error::{BackendError, ExtractionError};
use crate::models::{Extracted, Item, SummaryRecord};
use crate::ratelimit::TokenBucket;
use crate::utils::truncate_for_log;
use chrono::SecondsFormat;
use tracing::{debug, instrument, warn};

/// Fields available to prompt templates.
#[derive(Debug, Default, Clone, Copy)]
pub struct PromptFields<'a> {
    pub title: &'a str,
    pub subtitle: &'a str,
    pub domain: &'a str,
    pub url: &'a str,
    pub body: &'a str,
}

impl<'a> PromptFields<'a> {
    pub fn from_item(item: &'a Item) -> Self {
        Self {
            title: &item.title,
            subtitle: &item.subtitle,
            domain: &item.domain,
            url: &item.address,
            body: &item.body,
        }
    }
}

/// Fill `{categories}`, `{title}`, `{subtitle}`, `{domain}`, `{url}` and `{body}`.
///
/// `{body}` is substituted last so placeholder-like text inside an article is
/// left alone.
pub fn render_template(template: &str, categories: &[String], fields: &PromptFields<'_>) -> String {
    template
        .replace("{categories}", &categories.join(", "))
        .replace("{title}", fields.title)
        .replace("{subtitle}", fields.subtitle)
        .replace("{domain}", fields.domain)
        .replace("{url}", fields.url)
        .replace("{body}", fields.body)
}

pub struct ExtractionEngine<B> {
    backend: B,
    limiter: TokenBucket,
    prompts: Prompts,
    categories: Vec<String>,
    temperature: f32,
    max_tokens: u32,
}

impl<B: GenerationBackend> ExtractionEngine<B> {
    pub fn new(
        backend: B,
        limiter: TokenBucket,
        prompts: Prompts,
        categories: Vec<String>,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            backend,
            limiter,
            prompts,
            categories,
            temperature,
            max_tokens,
        }
    }

    /// Build an engine from the run configuration.
    pub fn from_config(backend: B, config: &RunConfig) -> Self {
        Self::new(
            backend,
            TokenBucket::per_minute(config.rate_limit.tokens_per_minute),
            config.prompts.clone(),
            config.categories.clone(),
            config.generation.temperature,
            config.generation.max_tokens,
        )
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Summarize and categorize one text.
    pub async fn extract(&mut self, fields: &PromptFields<'_>) -> Result<Extracted, ExtractionError> {
        let system = render_template(&self.prompts.system, &self.categories, fields);
        let user = render_template(&self.prompts.user, &self.categories, fields);

        let generation = self
            .backend
            .generate(&user, Some(&system), self.temperature, self.max_tokens)
            .await?;

        match generation.tokens_used {
            Some(used) => self.limiter.consume(used).await,
            None => debug!(backend = self.backend.name(), "No token usage reported; rate limiting skipped"),
        }

        decode_answer(&generation.content).map_err(|e| {
            debug!(
                response_preview = %truncate_for_log(&generation.content, 300),
                "Answer did not decode"
            );
            ExtractionError::Decode(e)
        })
    }

    /// Extract a summary for a stored item.
    ///
    /// Returns `Ok(None)` when the answer could not be decoded (logged with
    /// the item's address and domain). The returned record takes its identity
    /// fields from `item`, never from the model.
    #[instrument(level = "info", skip_all, fields(address = %item.address, domain = %item.domain))]
    pub async fn summarize(&mut self, item: &Item) -> Result<Option<SummaryRecord>, BackendError> {
        match self.extract(&PromptFields::from_item(item)).await {
            Ok(extracted) => {
                debug!(
                    date = ?item.date.map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true)),
                    category = %extracted.category,
                    summary = %extracted.summary,
                    "Extracted summary"
                );
                Ok(Some(SummaryRecord::from_item(item, extracted)))
            }
            Err(ExtractionError::Decode(e)) => {
                warn!(
                    address = %item.address,
                    domain = %item.domain,
                    error = %e,
                    "Model answer rejected; skipping post"
                );
                Ok(None)
            }
            Err(ExtractionError::Backend(e)) => Err(e),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backend::Generation;
    use crate::models::ORIGIN_SUBSTACK;
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Backend that replays scripted answers and records every prompt.
    #[derive(Default)]
    pub(crate) struct ScriptedBackend {
        pub answers: Mutex<VecDeque<Result<Generation, BackendError>>>,
        pub prompts: Mutex<Vec<(String, Option<String>)>>,
    }

    impl ScriptedBackend {
        pub(crate) fn replying(answers: Vec<&str>) -> Self {
            let backend = Self::default();
            backend.answers.lock().unwrap().extend(answers.into_iter().map(|a| {
                Ok(Generation {
                    content: a.to_string(),
                    tokens_used: Some(100),
                })
            }));
            backend
        }

        pub(crate) fn push(&self, answer: Result<Generation, BackendError>) {
            self.answers.lock().unwrap().push_back(answer);
        }

        pub(crate) fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    impl GenerationBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(
            &self,
            prompt: &str,
            system_prompt: Option<&str>,
            _temperature: f32,
            _max_tokens: u32,
        ) -> Result<Generation, BackendError> {
            self.prompts
                .lock()
                .unwrap()
                .push((prompt.to_string(), system_prompt.map(str::to_string)));
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(BackendError::EmptyResponse))
        }
    }

    pub(crate) fn engine<B: GenerationBackend>(backend: B) -> ExtractionEngine<B> {
        ExtractionEngine::new(
            backend,
            TokenBucket::per_minute(10_000),
            Prompts {
                system: "You write newsletters.".to_string(),
                user: "Categories: {categories}\nTitle: {title}\n\n{body}".to_string(),
            },
            vec!["leadership".to_string(), "go to market".to_string()],
            0.7,
            150,
        )
    }

    fn item() -> Item {
        let now = Utc::now();
        Item {
            domain: "alpha".to_string(),
            address: "https://alpha.substack.com/p/one".to_string(),
            title: "One".to_string(),
            subtitle: String::new(),
            like_count: 0,
            date: None,
            body: "Body text {title}".to_string(),
            origin: ORIGIN_SUBSTACK.to_string(),
            first_seen: now,
            last_updated: now,
            processed: false,
        }
    }

    #[test]
    fn test_render_template_fills_every_placeholder() {
        let fields = PromptFields {
            title: "T",
            subtitle: "S",
            domain: "d",
            url: "https://d.test/p/x",
            body: "B",
        };
        let out = render_template(
            "{categories}|{title}|{subtitle}|{domain}|{url}|{body}",
            &["a".to_string(), "b c".to_string()],
            &fields,
        );
        assert_eq!(out, "a, b c|T|S|d|https://d.test/p/x|B");
    }

    #[tokio::test]
    async fn test_prompt_embeds_body_and_categories() {
        let mut engine = engine(ScriptedBackend::replying(vec![
            r#"{"summary": "S", "category": "leadership"}"#,
        ]));
        engine.summarize(&item()).await.unwrap();

        let prompts = engine.backend().prompts.lock().unwrap();
        let (user, system) = &prompts[0];
        assert!(user.contains("Categories: leadership, go to market"));
        assert!(user.contains("Title: One"));
        // Body placeholders are not expanded.
        assert!(user.contains("Body text {title}"));
        assert_eq!(system.as_deref(), Some("You write newsletters."));
    }

    #[tokio::test]
    async fn test_identity_fields_come_from_item() {
        let mut engine = engine(ScriptedBackend::replying(vec![
            r#"```json
{"summary": "Great read.", "category": "Leadership", "url": "https://evil.test", "domain": "evil"}
```"#,
        ]));
        let record = engine.summarize(&item()).await.unwrap().unwrap();
        assert_eq!(record.address, "https://alpha.substack.com/p/one");
        assert_eq!(record.domain, "alpha");
        assert_eq!(record.summary, "Great read.");
        assert_eq!(record.category, "Leadership");
    }

    #[tokio::test]
    async fn test_undecodable_answer_yields_none() {
        let mut engine = engine(ScriptedBackend::replying(vec![
            "Sorry, I cannot help with that.",
            r#"{"error": "no content to summarize"}"#,
        ]));
        assert!(engine.summarize(&item()).await.unwrap().is_none());
        assert!(engine.summarize(&item()).await.unwrap().is_none());
        assert_eq!(engine.backend().calls(), 2);
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let backend = ScriptedBackend::default();
        backend.push(Err(BackendError::Status {
            status: 500,
            body: "boom".to_string(),
        }));
        let mut engine = engine(backend);
        let err = engine.summarize(&item()).await.unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_usage_is_charged_to_bucket() {
        let mut engine = engine(ScriptedBackend::replying(vec![
            r#"{"summary": "S", "category": "leadership"}"#,
        ]));
        engine.summarize(&item()).await.unwrap();
        assert!(engine.limiter.available() < engine.limiter.capacity());
    }

    #[tokio::test]
    async fn test_unmetered_backend_skips_bucket() {
        let backend = ScriptedBackend::default();
        backend.push(Ok(Generation {
            content: r#"{"summary": "S", "category": "leadership"}"#.to_string(),
            tokens_used: None,
        }));
        let mut engine = engine(backend);
        let record = engine.summarize(&item()).await.unwrap();
        assert!(record.is_some());
        assert_eq!(engine.limiter.available(), engine.limiter.capacity());
    }
}
