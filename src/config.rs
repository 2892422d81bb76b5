//! Configuration types for PDF-to-CSV extraction.
//!
//! All run behaviour is controlled through [`ExtractionConfig`], built via
//! its [`ExtractionConfigBuilder`]. One struct for every knob makes configs
//! easy to share, log, and compare between runs.

use crate::error::Pdf2CsvError;
use crate::pipeline::chunk::DEFAULT_MAX_CHUNK_CHARS;
use crate::pipeline::csv_reader::{ParseStrategy, DEFAULT_STRATEGIES};
use crate::pipeline::extract::TableStrategy;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Most tables one run may ask for.
pub const MAX_TABLES: usize = 5;

/// Configuration for one extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdf2csv::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .table_names(["Invoices", "InvoiceLines"])
///     .max_chunk_chars(8_000)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// assert_eq!(config.table_names.len(), 2);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Largest chunk of document text sent in one JSON call, in characters.
    /// Default: 12 000.
    ///
    /// Larger chunks mean fewer calls and fewer merge collisions, but each
    /// call must fit the model's context together with the schema and
    /// few-shot examples.
    pub max_chunk_chars: usize,

    /// LLM model identifier, e.g. "gpt-4.1-mini". If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "gemini", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Temperature for the per-chunk JSON calls. Default: 0.1.
    pub json_temperature: f32,

    /// Temperature for the JSON→CSV call. Default: 0.0.
    pub csv_temperature: f32,

    /// Temperature for context/relationship suggestions. Default: 0.3.
    pub suggestion_temperature: f32,

    /// Output token cap for JSON and CSV calls. Default: provider default.
    pub max_tokens: Option<usize>,

    /// Output token cap for suggestion calls. Default: 4096.
    pub suggestion_max_tokens: usize,

    /// Table-detection hint passed to the extractor. Default: auto.
    pub table_strategy: TableStrategy,

    /// Names of the CSV tables to produce, 1 to [`MAX_TABLES`]. Default: `["Table1"]`.
    pub table_names: Vec<String>,

    /// Validate the merged JSON against the entity schema. Default: true.
    pub validate_schema: bool,

    /// CSV parse strategies, tried in order. Default: strict, then repair.
    pub csv_strategies: Vec<ParseStrategy>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-LLM-call timeout in seconds. Default: none.
    pub api_timeout_secs: Option<u64>,

    /// Characters of the first page shown to the suggestion prompts. Default: 8000.
    pub suggestion_snippet_chars: usize,

    /// Optional per-chunk progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            model: None,
            provider_name: None,
            provider: None,
            json_temperature: 0.1,
            csv_temperature: 0.0,
            suggestion_temperature: 0.3,
            max_tokens: None,
            suggestion_max_tokens: 4096,
            table_strategy: TableStrategy::default(),
            table_names: vec!["Table1".to_string()],
            validate_schema: true,
            csv_strategies: DEFAULT_STRATEGIES.to_vec(),
            password: None,
            download_timeout_secs: 120,
            api_timeout_secs: None,
            suggestion_snippet_chars: 8000,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("max_chunk_chars", &self.max_chunk_chars)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("json_temperature", &self.json_temperature)
            .field("csv_temperature", &self.csv_temperature)
            .field("max_tokens", &self.max_tokens)
            .field("table_strategy", &self.table_strategy)
            .field("table_names", &self.table_names)
            .field("validate_schema", &self.validate_schema)
            .field("csv_strategies", &self.csv_strategies)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("progress_callback", &self.progress_callback.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn max_chunk_chars(mut self, n: usize) -> Self {
        self.config.max_chunk_chars = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn json_temperature(mut self, t: f32) -> Self {
        self.config.json_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn csv_temperature(mut self, t: f32) -> Self {
        self.config.csv_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn suggestion_temperature(mut self, t: f32) -> Self {
        self.config.suggestion_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = Some(n);
        self
    }

    pub fn suggestion_max_tokens(mut self, n: usize) -> Self {
        self.config.suggestion_max_tokens = n;
        self
    }

    pub fn table_strategy(mut self, strategy: TableStrategy) -> Self {
        self.config.table_strategy = strategy;
        self
    }

    /// Set the table names; blank names become `Table<i>` (1-based).
    pub fn table_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.table_names = names
            .into_iter()
            .enumerate()
            .map(|(i, n)| {
                let n = n.into().trim().to_string();
                if n.is_empty() {
                    format!("Table{}", i + 1)
                } else {
                    n
                }
            })
            .collect();
        self
    }

    pub fn validate_schema(mut self, v: bool) -> Self {
        self.config.validate_schema = v;
        self
    }

    pub fn csv_strategies(mut self, strategies: Vec<ParseStrategy>) -> Self {
        self.config.csv_strategies = strategies;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = Some(secs.max(1));
        self
    }

    pub fn suggestion_snippet_chars(mut self, n: usize) -> Self {
        self.config.suggestion_snippet_chars = n;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, Pdf2CsvError> {
        let c = &self.config;
        if c.table_names.is_empty() || c.table_names.len() > MAX_TABLES {
            return Err(Pdf2CsvError::InvalidConfig(format!(
                "between 1 and {MAX_TABLES} table names are required, got {}",
                c.table_names.len()
            )));
        }
        for (i, name) in c.table_names.iter().enumerate() {
            if c.table_names[..i].contains(name) {
                return Err(Pdf2CsvError::InvalidConfig(format!(
                    "table name '{name}' is given twice"
                )));
            }
            if name.contains('\n') || name.contains("===") {
                return Err(Pdf2CsvError::InvalidConfig(format!(
                    "table name '{name}' cannot contain a line break or '==='"
                )));
            }
        }
        if c.csv_strategies.is_empty() {
            return Err(Pdf2CsvError::InvalidConfig(
                "at least one CSV parse strategy is required".into(),
            ));
        }
        Ok(self.config)
    }
}
