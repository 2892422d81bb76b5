//! Document text extraction: PDF bytes → one text string per page.
//!
//! Extraction sits behind the [`DocumentExtractor`] trait so the rest of
//! the pipeline never touches pdfium directly and tests can substitute a
//! scripted extractor. The default [`PdfiumExtractor`] binds the pdfium
//! shared library through `pdfium-render`.
//!
//! ## Why synchronous?
//!
//! pdfium is a C++ library with thread-local state; its calls block and
//! must not run on a Tokio worker. The trait is therefore plain `fn`, and
//! [`crate::convert::extract_pages`] moves the call onto the blocking pool
//! with `spawn_blocking`.

use crate::error::Pdf2CsvError;
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Table-detection hint forwarded to the extractor.
///
/// The pipeline does no table detection of its own; an extractor that
/// cannot detect tables returns whole-page text whatever the hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableStrategy {
    /// Ruling lines first, then text alignment. (default)
    #[default]
    Auto,
    /// Ruling lines only.
    Lattice,
    /// Text alignment only.
    Matrix,
}

impl fmt::Display for TableStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TableStrategy::Auto => "auto",
            TableStrategy::Lattice => "lattice",
            TableStrategy::Matrix => "matrix",
        })
    }
}

impl FromStr for TableStrategy {
    type Err = Pdf2CsvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(TableStrategy::Auto),
            "lattice" => Ok(TableStrategy::Lattice),
            "matrix" => Ok(TableStrategy::Matrix),
            other => Err(Pdf2CsvError::InvalidConfig(format!(
                "unknown table strategy '{other}' (expected auto, lattice or matrix)"
            ))),
        }
    }
}

/// Anything that can turn a PDF into per-page text.
pub trait DocumentExtractor: Send + Sync {
    /// Extract the text of every page, in page order.
    ///
    /// `name` is only used in error messages. A page without text yields an
    /// empty string, so the result always has one entry per page.
    fn extract_pages(
        &self,
        name: &str,
        bytes: &[u8],
        strategy: TableStrategy,
    ) -> Result<Vec<String>, Pdf2CsvError>;
}

/// [`DocumentExtractor`] backed by the pdfium library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumExtractor {
    password: Option<String>,
    library_path: Option<PathBuf>,
}

impl PdfiumExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// User password for encrypted documents.
    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    /// Use the pdfium library at `path` (a file, or a directory holding it).
    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    /// Bind pdfium, from most specific location to least specific.
    ///
    /// 1. explicit library path, else `PDFIUM_LIB_PATH`
    /// 2. the platform library name in the working directory
    /// 3. the system library search path
    fn bind(&self) -> Result<Pdfium, Pdf2CsvError> {
        let explicit = self
            .library_path
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

        if let Some(path) = explicit {
            let lib = library_file(&path);
            debug!("Binding pdfium from {}", lib.display());
            return Pdfium::bind_to_library(&lib).map(Pdfium::new).map_err(|e| {
                Pdf2CsvError::PdfiumBindingFailed(format!("{}: {e:?}", lib.display()))
            });
        }

        Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map(Pdfium::new)
            .map_err(|e| Pdf2CsvError::PdfiumBindingFailed(format!("{e:?}")))
    }
}

fn library_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(path)
    } else {
        path.to_path_buf()
    }
}

impl DocumentExtractor for PdfiumExtractor {
    fn extract_pages(
        &self,
        name: &str,
        bytes: &[u8],
        strategy: TableStrategy,
    ) -> Result<Vec<String>, Pdf2CsvError> {
        let pdfium = self.bind()?;
        let password = self.password.as_deref();

        let document = pdfium
            .load_pdf_from_byte_slice(bytes, password)
            .map_err(|e| map_load_error(name, password.is_some(), e))?;

        // pdfium exposes no table finder; every page is read as plain text.
        debug!("Table strategy '{}' requested; using whole-page text", strategy);

        let pages = document.pages();
        let mut out = Vec::with_capacity(pages.len() as usize);
        for (idx, page) in pages.iter().enumerate() {
            let text = page.text().map_err(|e| Pdf2CsvError::PageTextFailed {
                page: idx + 1,
                detail: format!("{e:?}"),
            })?;
            out.push(text.all().trim().to_string());
        }

        info!("Extracted text from {} page(s) of '{}'", out.len(), name);
        Ok(out)
    }
}

fn map_load_error(name: &str, had_password: bool, e: PdfiumError) -> Pdf2CsvError {
    let detail = format!("{e:?}");
    if detail.to_ascii_lowercase().contains("password") {
        if had_password {
            Pdf2CsvError::WrongPassword { name: name.to_string() }
        } else {
            Pdf2CsvError::PasswordRequired { name: name.to_string() }
        }
    } else {
        Pdf2CsvError::CorruptPdf {
            name: name.to_string(),
            detail,
        }
    }
}
