//! LLM interaction: the text-generation seam and its provider-backed default.
//!
//! The pipeline only ever needs "prompt in, text out", so it talks to the
//! model through the small [`TextGenerator`] trait. [`ProviderGenerator`]
//! implements it over any `edgequake_llm` provider; tests implement it with
//! scripted responses.
//!
//! ## No retries
//!
//! A failed call is terminal for the run. The error is classified
//! (rate limit, authentication, timeout, other) so the caller can show the
//! right remediation, and the user re-triggers generation by hand.

use crate::config::ExtractionConfig;
use crate::error::Pdf2CsvError;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Per-call generation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: Option<usize>,
    /// Ask for a bare JSON object.
    pub json_response: bool,
    /// Pipeline step, used to label errors and logs.
    pub step: String,
}

impl GenerationOptions {
    pub fn new(step: impl Into<String>, temperature: f32) -> Self {
        Self {
            temperature,
            max_tokens: None,
            json_response: false,
            step: step.into(),
        }
    }

    pub fn max_tokens(mut self, n: Option<usize>) -> Self {
        self.max_tokens = n;
        self
    }

    pub fn json(mut self) -> Self {
        self.json_response = true;
        self
    }

    /// Same options, relabelled for another step.
    pub fn for_step(&self, step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            ..self.clone()
        }
    }
}

/// Prompt in, text out.
///
/// Implementations must be cheap to share: the pipeline holds them behind
/// an `Arc` and may move them into a stream.
pub trait TextGenerator: Send + Sync {
    fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> impl Future<Output = Result<String, Pdf2CsvError>> + Send;

    /// Tokens used so far; zero for generators that do not track usage.
    fn usage(&self) -> TokenUsage {
        TokenUsage::default()
    }
}

impl<T: TextGenerator> TextGenerator for Arc<T> {
    fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> impl Future<Output = Result<String, Pdf2CsvError>> + Send {
        (**self).generate(prompt, options)
    }

    fn usage(&self) -> TokenUsage {
        (**self).usage()
    }
}

/// Token totals accumulated across calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TokenUsage {
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

const JSON_SYSTEM_PROMPT: &str =
    "Respond with a single valid JSON object only. Do not add explanations or code fences.";

/// [`TextGenerator`] over an `edgequake_llm` provider.
pub struct ProviderGenerator {
    provider: Arc<dyn LLMProvider>,
    label: String,
    timeout: Option<Duration>,
    calls: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

impl ProviderGenerator {
    /// Wrap `provider`; `label` names it in error messages.
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
            timeout: None,
            calls: AtomicU64::new(0),
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
        }
    }

    /// Resolve the provider from `config` (see [`resolve_provider`]).
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, Pdf2CsvError> {
        let provider = resolve_provider(config)?;
        let label = config
            .provider_name
            .clone()
            .unwrap_or_else(|| "auto".to_string());
        Ok(Self::new(provider, label).with_timeout(config.api_timeout_secs))
    }

    /// Bound every call; `None` waits indefinitely.
    pub fn with_timeout(mut self, secs: Option<u64>) -> Self {
        self.timeout = secs.map(Duration::from_secs);
        self
    }
}

impl TextGenerator for ProviderGenerator {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, Pdf2CsvError> {
        let mut messages = Vec::with_capacity(2);
        if options.json_response {
            messages.push(ChatMessage::system(JSON_SYSTEM_PROMPT));
        }
        messages.push(ChatMessage::user(prompt));

        let completion = CompletionOptions {
            temperature: Some(options.temperature),
            max_tokens: options.max_tokens,
            ..Default::default()
        };

        let start = Instant::now();
        let call = self.provider.chat(&messages, Some(&completion));
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(r) => r,
                Err(_) => {
                    warn!("{}: no answer after {}s", options.step, limit.as_secs());
                    return Err(Pdf2CsvError::ApiTimeout {
                        step: options.step.clone(),
                        secs: limit.as_secs(),
                    });
                }
            },
            None => call.await,
        };

        match result {
            Ok(response) => {
                self.calls.fetch_add(1, Ordering::Relaxed);
                self.input_tokens
                    .fetch_add(response.prompt_tokens as u64, Ordering::Relaxed);
                self.output_tokens
                    .fetch_add(response.completion_tokens as u64, Ordering::Relaxed);
                debug!(
                    "{}: {} input tokens, {} output tokens, {:?}",
                    options.step,
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                Ok(response.content)
            }
            Err(e) => {
                let message = e.to_string();
                warn!("{}: call failed: {}", options.step, message);
                Err(classify_provider_error(&self.label, &options.step, message))
            }
        }
    }

    fn usage(&self) -> TokenUsage {
        TokenUsage {
            calls: self.calls.load(Ordering::Relaxed),
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.output_tokens.load(Ordering::Relaxed),
        }
    }
}

/// Map a provider error message onto the error taxonomy.
pub fn classify_provider_error(provider: &str, step: &str, message: String) -> Pdf2CsvError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("rate_limit") {
        Pdf2CsvError::RateLimitExceeded {
            provider: provider.to_string(),
            step: step.to_string(),
        }
    } else if lower.contains("401")
        || lower.contains("403")
        || lower.contains("unauthorized")
        || lower.contains("api key")
        || lower.contains("authentication")
    {
        Pdf2CsvError::AuthError {
            provider: provider.to_string(),
            detail: message,
        }
    } else {
        Pdf2CsvError::LlmApiError {
            step: step.to_string(),
            message,
        }
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Pdf2CsvError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2CsvError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most specific to least specific.
///
/// 1. pre-built provider (`config.provider`)
/// 2. named provider + model (`config.provider_name`, `config.model`)
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set
/// 4. OpenAI, when `OPENAI_API_KEY` is set
/// 5. `ProviderFactory::from_env` auto-detection
///
/// Fails before any call is made when nothing is configured.
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, Pdf2CsvError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2CsvError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_builder() {
        let o = GenerationOptions::new("CSV generation from JSON", 0.0)
            .max_tokens(Some(2048))
            .json();
        assert_eq!(o.temperature, 0.0);
        assert_eq!(o.max_tokens, Some(2048));
        assert!(o.json_response);
        let relabelled = o.for_step("chunk 3");
        assert_eq!(relabelled.step, "chunk 3");
        assert_eq!(relabelled.max_tokens, Some(2048));
    }

    #[test]
    fn classifies_rate_limits() {
        let e = classify_provider_error("openai", "chunk 1", "HTTP 429 Too Many Requests".into());
        assert!(matches!(e, Pdf2CsvError::RateLimitExceeded { .. }));
        let e = classify_provider_error("gemini", "chunk 1", "Rate limit reached".into());
        assert!(matches!(e, Pdf2CsvError::RateLimitExceeded { .. }));
    }

    #[test]
    fn classifies_auth_errors() {
        let e = classify_provider_error("openai", "x", "401 Unauthorized: invalid api key".into());
        match e {
            Pdf2CsvError::AuthError { provider, detail } => {
                assert_eq!(provider, "openai");
                assert!(detail.contains("invalid api key"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn other_errors_keep_step() {
        let e = classify_provider_error("openai", "JSON generation on chunk 4", "boom".into());
        match e {
            Pdf2CsvError::LlmApiError { step, message } => {
                assert_eq!(step, "JSON generation on chunk 4");
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    struct Echo;

    impl TextGenerator for Echo {
        async fn generate(
            &self,
            prompt: &str,
            options: &GenerationOptions,
        ) -> Result<String, Pdf2CsvError> {
            Ok(format!("{}:{prompt}", options.step))
        }
    }

    #[tokio::test]
    async fn arc_forwards_to_inner_generator() {
        let g = Arc::new(Echo);
        let out = g.generate("hi", &GenerationOptions::new("s", 0.1)).await.unwrap();
        assert_eq!(out, "s:hi");
    }
}
