//! Few-shot examples: (document text, desired JSON) pairs shown to the model.
//!
//! A directory of examples holds `name.json` files, each next to the
//! `name.pdf` it was written from. The PDF is run through the same
//! [`DocumentExtractor`] as the real input so the example text looks
//! exactly like what the model will receive.

use crate::error::Pdf2CsvError;
use crate::pipeline::extract::{DocumentExtractor, TableStrategy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// One worked example for the JSON prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FewShotExample {
    /// Text extracted from the example PDF.
    pub source_text: String,
    /// The JSON the model should have produced for it.
    pub target_output: String,
}

impl FewShotExample {
    /// Build an example from an in-memory PDF and its JSON.
    pub fn from_pdf(
        extractor: &dyn DocumentExtractor,
        name: &str,
        pdf: &[u8],
        target_output: impl Into<String>,
    ) -> Result<Self, Pdf2CsvError> {
        let pages = extractor.extract_pages(name, pdf, TableStrategy::Auto)?;
        Ok(Self {
            source_text: pages.join("\n"),
            target_output: target_output.into(),
        })
    }

    fn is_usable(&self) -> bool {
        !self.source_text.trim().is_empty() && !self.target_output.trim().is_empty()
    }
}

/// Load up to `max` examples from `dir`, in file-name order.
///
/// A `*.json` file is used only when a sibling `*.pdf` exists and both
/// yield non-empty text. Unreadable files are skipped with a warning; only
/// an unreadable directory is an error.
pub fn load_examples(
    dir: &Path,
    max: usize,
    extractor: &dyn DocumentExtractor,
) -> Result<Vec<FewShotExample>, Pdf2CsvError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        Pdf2CsvError::InvalidConfig(format!(
            "cannot read examples directory '{}': {e}",
            dir.display()
        ))
    })?;

    let mut json_files: Vec<_> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    json_files.sort();

    let mut examples = Vec::new();
    for json_path in json_files {
        if examples.len() >= max {
            break;
        }

        let pdf_path = json_path.with_extension("pdf");
        if !pdf_path.is_file() {
            debug!("Example {}: no matching PDF, skipped", json_path.display());
            continue;
        }

        let target_output = match std::fs::read_to_string(&json_path) {
            Ok(text) => text,
            Err(e) => {
                warn!("Example {}: unreadable, skipped: {}", json_path.display(), e);
                continue;
            }
        };

        let name = pdf_path.display().to_string();
        let example = std::fs::read(&pdf_path)
            .map_err(|e| Pdf2CsvError::Internal(e.to_string()))
            .and_then(|bytes| FewShotExample::from_pdf(extractor, &name, &bytes, target_output));

        match example {
            Ok(ex) if ex.is_usable() => examples.push(ex),
            Ok(_) => debug!("Example {}: empty text, skipped", name),
            Err(e) => warn!("Example {}: extraction failed, skipped: {}", name, e),
        }
    }

    debug!("Loaded {} example(s) from {}", examples.len(), dir.display());
    Ok(examples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Treats the PDF bytes as UTF-8 page text; `FAIL` makes extraction fail.
    struct Utf8Extractor;

    impl DocumentExtractor for Utf8Extractor {
        fn extract_pages(
            &self,
            name: &str,
            bytes: &[u8],
            _strategy: TableStrategy,
        ) -> Result<Vec<String>, Pdf2CsvError> {
            let text = String::from_utf8_lossy(bytes).to_string();
            if text == "FAIL" {
                return Err(Pdf2CsvError::CorruptPdf {
                    name: name.to_string(),
                    detail: "scripted".into(),
                });
            }
            Ok(text.split('\u{c}').map(str::to_string).collect())
        }
    }

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn loads_pairs_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.json", "{\"entities\":[]}");
        write(dir.path(), "b.pdf", "page b1\u{c}page b2");
        write(dir.path(), "a.json", "{\"a\":1}");
        write(dir.path(), "a.pdf", "page a");

        let examples = load_examples(dir.path(), 10, &Utf8Extractor).unwrap();
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].source_text, "page a");
        assert_eq!(examples[1].source_text, "page b1\npage b2");
        assert_eq!(examples[1].target_output, "{\"entities\":[]}");
    }

    #[test]
    fn skips_unpaired_empty_and_failing_examples() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "lonely.json", "{}");
        write(dir.path(), "blank.json", "   ");
        write(dir.path(), "blank.pdf", "text");
        write(dir.path(), "broken.json", "{}");
        write(dir.path(), "broken.pdf", "FAIL");
        write(dir.path(), "ok.json", "{}");
        write(dir.path(), "ok.pdf", "text");
        write(dir.path(), "notes.txt", "ignored");

        let examples = load_examples(dir.path(), 10, &Utf8Extractor).unwrap();
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].source_text, "text");
    }

    #[test]
    fn stops_at_max() {
        let dir = tempfile::tempdir().unwrap();
        for n in ["1", "2", "3"] {
            write(dir.path(), &format!("{n}.json"), "{}");
            write(dir.path(), &format!("{n}.pdf"), n);
        }
        let examples = load_examples(dir.path(), 2, &Utf8Extractor).unwrap();
        assert_eq!(examples.len(), 2);
        assert!(load_examples(dir.path(), 0, &Utf8Extractor).unwrap().is_empty());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            load_examples(&missing, 1, &Utf8Extractor),
            Err(Pdf2CsvError::InvalidConfig(_))
        ));
    }
}
