//! Error types for the edgequake-pdf2csv library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2CsvError`]: **Fatal**: the run cannot proceed (unreadable
//!   PDF, provider not configured, an LLM call failed, the model returned
//!   no table markers). Returned as `Err(Pdf2CsvError)` from the
//!   orchestration functions in [`crate::convert`].
//!
//! * [`PipelineWarning`]: **Non-fatal**: one fragment could not be parsed,
//!   a CSV body needed repair, a table came back empty. Collected
//!   alongside the best-effort result so callers can show them next to
//!   the tables instead of losing the whole run.
//!
//! A malformed fragment is recoverable because the other chunks still carry
//! data. A failed LLM call is not: merging the remaining fragments would
//! present an incomplete document as if it were complete.

use std::path::PathBuf;
use thiserror::Error;

/// Which part of the pipeline a fatal error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ErrorCategory {
    /// The document could not be located, opened, or read.
    Extraction,
    /// Credentials or options are missing or invalid; no call was made.
    Configuration,
    /// An external LLM call failed.
    Generation,
    /// The model answered, but not in the expected delimited format.
    Format,
    /// The merged JSON does not satisfy the entity/relationship schema.
    Validation,
    /// Writing results to disk failed.
    Output,
    /// Anything else.
    Internal,
}

/// All fatal errors returned by the edgequake-pdf2csv library.
#[derive(Debug, Error)]
pub enum Pdf2CsvError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes were read, but they are not a PDF.
    #[error("'{name}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{name}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { name: String, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{name}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { name: String },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{name}'")]
    WrongPassword { name: String },

    /// pdfium returned an error while reading the text of one page.
    #[error("Text extraction failed for page {page}: {detail}")]
    PageTextFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error("Failed to bind to pdfium library: {0}")]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API returned an error during `step`.
    #[error("LLM call failed during {step}: {message}")]
    LlmApiError { step: String, message: String },

    /// LLM API returned HTTP 429.
    #[error("Rate limit exceeded for provider '{provider}' during {step}")]
    RateLimitExceeded { provider: String, step: String },

    /// LLM API returned an authentication error (401/403).
    #[error("Authentication error from provider '{provider}': {detail}")]
    AuthError { provider: String, detail: String },

    /// The LLM call did not answer within the configured timeout.
    #[error("LLM call timed out after {secs}s during {step}")]
    ApiTimeout { step: String, secs: u64 },

    /// The document produced no chunks, so nothing was sent to the model.
    #[error("No JSON was generated: the document contains no extractable text")]
    NoFragments,

    // ── Format / validation errors ────────────────────────────────────────
    /// The JSON→CSV response contained no `=== START OF TABLE ===` blocks.
    #[error("The model did not return any table in the expected delimited format")]
    NoTablesFound { raw_output: String },

    /// The merged JSON does not conform to the entity/relationship schema.
    #[error("JSON validation failed:\n{}", .errors.join("\n"))]
    SchemaValidation { errors: Vec<String> },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output CSV file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2CsvError {
    /// Map the error onto the pipeline stage it belongs to.
    pub fn category(&self) -> ErrorCategory {
        use Pdf2CsvError::*;
        match self {
            FileNotFound { .. }
            | PermissionDenied { .. }
            | InvalidInput { .. }
            | DownloadFailed { .. }
            | DownloadTimeout { .. }
            | NotAPdf { .. }
            | CorruptPdf { .. }
            | PasswordRequired { .. }
            | WrongPassword { .. }
            | PageTextFailed { .. }
            | PdfiumBindingFailed(_) => ErrorCategory::Extraction,
            ProviderNotConfigured { .. } | InvalidConfig(_) => ErrorCategory::Configuration,
            LlmApiError { .. }
            | RateLimitExceeded { .. }
            | AuthError { .. }
            | ApiTimeout { .. }
            | NoFragments => ErrorCategory::Generation,
            NoTablesFound { .. } => ErrorCategory::Format,
            SchemaValidation { .. } => ErrorCategory::Validation,
            OutputWriteFailed { .. } => ErrorCategory::Output,
            Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Actionable advice for conditions the user can fix themselves.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Pdf2CsvError::PdfiumBindingFailed(_) => Some(
                "PDFium could not be loaded.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n\
  • Or place libpdfium next to the binary / in the working directory.\n\
  • Prebuilt libraries: https://github.com/bblanchon/pdfium-binaries",
            ),
            Pdf2CsvError::ProviderNotConfigured { .. } | Pdf2CsvError::AuthError { .. } => Some(
                "Check your API key: export OPENAI_API_KEY=... (or ANTHROPIC_API_KEY / GEMINI_API_KEY),\n\
or select a provider explicitly with --provider and --model.",
            ),
            Pdf2CsvError::RateLimitExceeded { .. } => Some(
                "The provider is throttling requests. Wait a minute and re-run, \
or raise --max-chunk-chars to send fewer, larger chunks.",
            ),
            Pdf2CsvError::ApiTimeout { .. } => Some(
                "Increase --api-timeout or lower --max-chunk-chars so each call does less work.",
            ),
            Pdf2CsvError::NoTablesFound { .. } => Some(
                "Inspect the raw model output above. Adding context, relationships or an \
example CSV usually helps the model follow the table marker format.",
            ),
            _ => None,
        }
    }
}

/// A non-fatal problem recovered from during a run.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PipelineWarning {
    /// A chunk response was not valid JSON and was left out of the merge.
    #[error("Fragment {index}: not valid JSON, skipped ({detail})")]
    FragmentUnparseable { index: usize, detail: String },

    /// A chunk response was valid JSON but not an object, so it has no keys to merge.
    #[error("Fragment {index}: top-level {kind} cannot be merged by key, skipped")]
    FragmentNotObject { index: usize, kind: String },

    /// A table body failed strict parsing and was rebuilt by a fallback strategy.
    #[error("Table '{table}': malformed CSV recovered with the {strategy} strategy")]
    CsvRepaired { table: String, strategy: String },

    /// A table block was present but contained no data rows.
    #[error("Table '{table}': no data rows")]
    EmptyTable { table: String },

    /// The model emitted the same table name more than once; the last block wins.
    #[error("Table '{table}': emitted more than once, keeping the last block")]
    DuplicateTable { table: String },

    /// A requested table name had no block in the model output.
    #[error("Table '{table}': requested but not returned by the model")]
    MissingTable { table: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_validation_display_lists_errors() {
        let e = Pdf2CsvError::SchemaValidation {
            errors: vec!["entities[0].id: missing field".into(), "extra: unknown".into()],
        };
        let msg = e.to_string();
        assert!(msg.contains("entities[0].id"), "got: {msg}");
        assert!(msg.contains("extra: unknown"), "got: {msg}");
    }

    #[test]
    fn llm_error_display_names_step() {
        let e = Pdf2CsvError::LlmApiError {
            step: "JSON generation on chunk 2".into(),
            message: "bad request".into(),
        };
        assert!(e.to_string().contains("chunk 2"));
        assert_eq!(e.category(), ErrorCategory::Generation);
    }

    #[test]
    fn categories_follow_taxonomy() {
        assert_eq!(
            Pdf2CsvError::NotAPdf { name: "x".into(), magic: *b"PK\x03\x04" }.category(),
            ErrorCategory::Extraction
        );
        assert_eq!(
            Pdf2CsvError::InvalidConfig("x".into()).category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            Pdf2CsvError::NoTablesFound { raw_output: String::new() }.category(),
            ErrorCategory::Format
        );
    }

    #[test]
    fn remediation_only_for_user_fixable_errors() {
        let auth = Pdf2CsvError::AuthError {
            provider: "openai".into(),
            detail: "invalid key".into(),
        };
        assert!(auth.remediation().unwrap().contains("OPENAI_API_KEY"));
        assert!(Pdf2CsvError::Internal("boom".into()).remediation().is_none());
    }

    #[test]
    fn warning_display() {
        let w = PipelineWarning::FragmentNotObject {
            index: 3,
            kind: "array".into(),
        };
        assert!(w.to_string().contains("Fragment 3"));
        assert!(w.to_string().contains("array"));
    }
}
