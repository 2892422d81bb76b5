//! # edgequake-pdf2csv
//!
//! Turn the tables inside PDF documents into relational CSV files using a
//! Large Language Model.
//!
//! ## Why this crate?
//!
//! Tables in PDFs rarely survive plain text extraction as tables: columns
//! run together, rows wrap, and one logical record can span several pages.
//! This crate extracts the text, asks a model to rebuild it as a structured
//! JSON document of entities and relationships, then asks the model again
//! to split that document into the named CSV tables you want.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input    resolve local file or download from URL
//!  ├─ 2. Extract  per-page text via pdfium (spawn_blocking)
//!  ├─ 3. Suggest  optional context / relationship hints from page 1
//!  ├─ 4. JSON     one model call per chunk, fragments merged and validated
//!  ├─ 5. CSV      one model call; table blocks cut out by marker lines
//!  └─ 6. Output   parsed tables, warnings and stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2csv::{convert, write_tables, ConversionInputs, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = ExtractionConfig::builder()
//!         .table_names(["Customers", "Orders"])
//!         .build()?;
//!     let output = convert("invoices.pdf", &ConversionInputs::default(), &config).await?;
//!     for w in &output.warnings {
//!         eprintln!("warning: {w}");
//!     }
//!     write_tables(std::path::Path::new("out"), &output.tables)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2csv` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf2csv = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod fewshot;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod schema;
pub mod session;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, MAX_TABLES};
pub use convert::{
    convert, convert_bytes, convert_sync, convert_with, extract_pages, generate_csv_tables,
    generate_structured_json, suggest_context, ConversionInputs, CsvGeneration, JsonGeneration,
    SuggestedContext,
};
pub use error::{ErrorCategory, Pdf2CsvError, PipelineWarning};
pub use fewshot::{load_examples, FewShotExample};
pub use output::{write_tables, ConversionOutput, ConversionStats, NamedTable};
pub use pipeline::csv_reader::{parse_csv, parse_csv_with, ParseStrategy, Table};
pub use pipeline::extract::{DocumentExtractor, PdfiumExtractor, TableStrategy};
pub use pipeline::llm::{GenerationOptions, ProviderGenerator, TextGenerator, TokenUsage};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::PromptContext;
pub use schema::{validate_document, ExtractionDocument};
pub use session::{Session, SourceIdentity};
pub use stream::{stream_fragments, Fragment, FragmentStream};
