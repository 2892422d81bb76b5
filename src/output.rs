//! Result types of a run, and writing the tables to disk.

use crate::error::{Pdf2CsvError, PipelineWarning};
use crate::pipeline::csv_reader::{ParseStrategy, Table};
use crate::pipeline::llm::TokenUsage;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One parsed table, under the name the model gave it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedTable {
    pub name: String,
    pub table: Table,
    /// Parse strategy that produced `table`; `None` for a blank body.
    pub strategy: Option<ParseStrategy>,
}

impl NamedTable {
    /// `<sanitised name>.csv`
    pub fn file_name(&self) -> String {
        format!("{}.csv", sanitize_file_stem(&self.name))
    }
}

/// Timing and token counts for a full run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub page_count: usize,
    pub chunk_count: usize,
    pub table_count: usize,
    pub extraction_duration_ms: u64,
    pub json_duration_ms: u64,
    pub csv_duration_ms: u64,
    pub total_duration_ms: u64,
    /// Token totals; zero when the generator does not report usage.
    pub usage: TokenUsage,
}

/// Everything a full run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Extracted page text, one entry per page.
    pub pages: Vec<String>,
    /// Merged (and, when enabled, validated) JSON document.
    pub json: String,
    pub tables: Vec<NamedTable>,
    /// Non-fatal problems recovered from during the run.
    pub warnings: Vec<PipelineWarning>,
    pub stats: ConversionStats,
}

/// Turn a table name into a safe file stem.
///
/// Path separators, control characters and characters Windows rejects are
/// replaced with `_`; an empty result becomes `table`.
pub fn sanitize_file_stem(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').trim();
    if cleaned.is_empty() {
        "table".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Write one `<name>.csv` per table into `dir`, creating it if needed.
///
/// Names that sanitise to the same stem (compared case-insensitively, for
/// case-folding file systems) get `_2`, `_3`, … appended in table order, so
/// every table lands in its own file.
///
/// Each file is written to a temporary file in `dir` and then renamed, so
/// a crash never leaves a half-written CSV behind. Returns the paths in
/// table order.
pub fn write_tables(dir: &Path, tables: &[NamedTable]) -> Result<Vec<PathBuf>, Pdf2CsvError> {
    std::fs::create_dir_all(dir).map_err(|e| Pdf2CsvError::OutputWriteFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut used = HashSet::new();
    let mut written = Vec::with_capacity(tables.len());
    for t in tables {
        let base = sanitize_file_stem(&t.name);
        let stem = unique_stem(&base, &mut used);
        if stem != base {
            warn!("Table '{}' collides with an earlier file name; writing {}.csv", t.name, stem);
        }
        let path = dir.join(format!("{stem}.csv"));
        let csv = t.table.to_csv_string()?;
        let io_err = |e: std::io::Error| Pdf2CsvError::OutputWriteFailed {
            path: path.clone(),
            source: e,
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(&io_err)?;
        tmp.write_all(csv.as_bytes()).map_err(&io_err)?;
        tmp.persist(&path).map_err(|e| io_err(e.error))?;

        info!("Wrote {} ({} rows)", path.display(), t.table.rows.len());
        written.push(path);
    }
    Ok(written)
}

fn unique_stem(stem: &str, used: &mut HashSet<String>) -> String {
    let mut candidate = stem.to_string();
    let mut n = 1;
    while !used.insert(candidate.to_lowercase()) {
        n += 1;
        candidate = format!("{stem}_{n}");
    }
    candidate
}
