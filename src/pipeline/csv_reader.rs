//! Robust CSV reading: turn irregular model-written CSV into rectangular tables.
//!
//! Model output is *almost* CSV. Typical defects:
//!
//! - a free-text last column containing unescaped commas (`1,Widget, large`)
//! - trailing empty cells dropped (`4` instead of `4,`)
//! - a stray quote that throws a whole-document parser out of sync
//! - semicolons or pipes instead of commas
//!
//! Parsing is an ordered list of [`ParseStrategy`] values tried in turn
//! until one produces a rectangular table. The default chain is
//! `Strict → Repair`; `Repair` always succeeds, so the reader never fails.

use crate::error::Pdf2CsvError;
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Delimiters considered by the sniffer, in tie-break order.
pub const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Default strategy chain.
pub const DEFAULT_STRATEGIES: [ParseStrategy; 2] = [ParseStrategy::Strict, ParseStrategy::Repair];

/// A rectangular table: one header row plus data rows of the same width.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// True when there is neither a header nor any data.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.rows.is_empty()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.headers.len()
    }

    /// Every row has exactly as many cells as the header.
    pub fn is_rectangular(&self) -> bool {
        self.rows.iter().all(|r| r.len() == self.headers.len())
    }

    /// Serialise as UTF-8, comma-delimited CSV with a header row.
    ///
    /// Cells are quoted only when needed. An empty table serialises to `""`.
    pub fn to_csv_string(&self) -> Result<String, Pdf2CsvError> {
        if self.is_empty() {
            return Ok(String::new());
        }

        let mut writer = WriterBuilder::new().from_writer(Vec::<u8>::new());
        writer
            .write_record(&self.headers)
            .map_err(|e| Pdf2CsvError::Internal(format!("csv write: {e}")))?;
        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|e| Pdf2CsvError::Internal(format!("csv write: {e}")))?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| Pdf2CsvError::Internal(format!("csv flush: {}", e.error())))?;
        String::from_utf8(bytes).map_err(|e| Pdf2CsvError::Internal(format!("csv utf-8: {e}")))
    }
}

/// One way of turning CSV text into a [`Table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParseStrategy {
    /// Full quoting support with the sniffed delimiter; fails on any ragged row.
    Strict,
    /// Sniffed delimiter, line-by-line tokenizing, rows merged or padded to
    /// the header width. Always rectangular.
    Repair,
    /// Sniffed delimiter, line-by-line tokenizing, rows of the wrong width dropped.
    SkipMalformed,
}

impl fmt::Display for ParseStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParseStrategy::Strict => "strict",
            ParseStrategy::Repair => "repair",
            ParseStrategy::SkipMalformed => "skip-malformed",
        };
        f.write_str(name)
    }
}

/// A parsed table and the strategy that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTable {
    pub table: Table,
    /// `None` when the input was blank or no strategy succeeded.
    pub strategy: Option<ParseStrategy>,
}

/// Parse CSV text with the default strategy chain.
pub fn parse_csv(text: &str, has_header: bool) -> Table {
    parse_csv_with(text, has_header, &DEFAULT_STRATEGIES).table
}

/// Parse CSV text, trying `strategies` in order until one yields a
/// rectangular table. Blank input, or a chain where nothing succeeds,
/// gives an empty table. Never panics.
pub fn parse_csv_with(text: &str, has_header: bool, strategies: &[ParseStrategy]) -> ParsedTable {
    let text = text.trim();
    if text.is_empty() {
        return ParsedTable::default();
    }

    for &strategy in strategies {
        let attempt = match strategy {
            ParseStrategy::Strict => parse_strict(text, has_header),
            ParseStrategy::Repair => Some(parse_lines(text, has_header, RowPolicy::Fit)),
            ParseStrategy::SkipMalformed => Some(parse_lines(text, has_header, RowPolicy::Drop)),
        };
        match attempt {
            Some(table) if table.is_rectangular() => {
                return ParsedTable {
                    table,
                    strategy: Some(strategy),
                }
            }
            _ => debug!("CSV strategy '{}' failed, trying next", strategy),
        }
    }

    ParsedTable::default()
}

/// Pick the candidate delimiter that occurs most often outside quotes.
/// Ties go to the earlier candidate; no candidate at all gives a comma.
pub fn sniff_delimiter(line: &str) -> u8 {
    let mut counts = [0usize; CANDIDATE_DELIMITERS.len()];
    let mut in_quotes = false;
    for b in line.bytes() {
        if b == b'"' {
            in_quotes = !in_quotes;
            continue;
        }
        if in_quotes {
            continue;
        }
        if let Some(i) = CANDIDATE_DELIMITERS.iter().position(|&d| d == b) {
            counts[i] += 1;
        }
    }

    let mut best = 0;
    for i in 1..counts.len() {
        if counts[i] > counts[best] {
            best = i;
        }
    }
    if counts[best] == 0 {
        b','
    } else {
        CANDIDATE_DELIMITERS[best]
    }
}

// ── Strategy: strict ─────────────────────────────────────────────────────────

fn parse_strict(text: &str, has_header: bool) -> Option<Table> {
    // The csv reader accepts a quote left open at end of input and folds
    // every following line into that one field.
    if !quotes_balanced(text) {
        debug!("Strict CSV parse skipped: unbalanced quotes");
        return None;
    }

    let first = text.lines().find(|l| !l.trim().is_empty()).unwrap_or_default();
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(false)
        .delimiter(sniff_delimiter(first))
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for record in reader.records() {
        match record {
            Ok(r) => records.push(r.iter().map(str::to_string).collect::<Vec<_>>()),
            Err(e) => {
                debug!("Strict CSV parse failed: {}", e);
                return None;
            }
        }
    }

    let (headers, rows) = split_header(records, has_header);
    Some(Table { headers, rows })
}

/// Well-formed CSV has an even number of `"`: each quoted field opens and
/// closes once, and an escaped `""` adds two.
fn quotes_balanced(text: &str) -> bool {
    text.bytes().filter(|&b| b == b'"').count() % 2 == 0
}

// ── Strategies: repair / skip-malformed ─────────────────────────────────────

#[derive(Clone, Copy)]
enum RowPolicy {
    Fit,
    Drop,
}

fn parse_lines(text: &str, has_header: bool, policy: RowPolicy) -> Table {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let Some(first) = lines.first() else {
        return Table::default();
    };
    let delimiter = sniff_delimiter(first);

    let records: Vec<Vec<String>> = lines.iter().map(|l| tokenize_line(l, delimiter)).collect();
    let (headers, data) = split_header(records, has_header);
    let width = headers.len();
    if width == 0 {
        return Table::default();
    }

    let rows = data
        .into_iter()
        .filter(|r| !r.is_empty())
        .filter_map(|row| match policy {
            RowPolicy::Fit => Some(fit_row(row, width, delimiter)),
            RowPolicy::Drop => (row.len() == width).then_some(row),
        })
        .collect();

    Table { headers, rows }
}

/// Tokenize one physical line. Damage from a stray quote stays on its line.
fn tokenize_line(line: &str, delimiter: u8) -> Vec<String> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(line.as_bytes());

    match reader.records().next() {
        Some(Ok(record)) => record.iter().map(str::to_string).collect(),
        _ => line
            .split(char::from(delimiter))
            .map(str::to_string)
            .collect(),
    }
}

/// Merge overflow into the last column, or pad short rows with empty cells.
fn fit_row(mut row: Vec<String>, width: usize, delimiter: u8) -> Vec<String> {
    if row.len() > width {
        let tail = row
            .split_off(width - 1)
            .join(&char::from(delimiter).to_string());
        row.push(tail);
    } else if row.len() < width {
        row.resize(width, String::new());
    }
    row
}

/// Split off the header row, or synthesise `col_0..col_{n-1}` from the first row.
fn split_header(mut records: Vec<Vec<String>>, has_header: bool) -> (Vec<String>, Vec<Vec<String>>) {
    if records.is_empty() {
        return (Vec::new(), Vec::new());
    }
    if has_header {
        let headers = records.remove(0);
        (headers, records)
    } else {
        let headers = (0..records[0].len()).map(|i| format!("col_{i}")).collect();
        (headers, records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn well_formed_uses_strict() {
        let parsed = parse_csv_with("a,b\n1,2\n3,4", true, &DEFAULT_STRATEGIES);
        assert_eq!(parsed.strategy, Some(ParseStrategy::Strict));
        assert_eq!(parsed.table.headers, row(&["a", "b"]));
        assert_eq!(parsed.table.rows, vec![row(&["1", "2"]), row(&["3", "4"])]);
    }

    #[test]
    fn ragged_rows_are_repaired() {
        let parsed = parse_csv_with("a,b\n1,2,3\n4", true, &DEFAULT_STRATEGIES);
        assert_eq!(parsed.strategy, Some(ParseStrategy::Repair));
        assert_eq!(parsed.table.headers, row(&["a", "b"]));
        assert_eq!(parsed.table.rows, vec![row(&["1", "2,3"]), row(&["4", ""])]);
    }

    #[test]
    fn blank_input_is_empty_table() {
        assert!(parse_csv("", true).is_empty());
        assert!(parse_csv("  \n \n", true).is_empty());
        assert_eq!(parse_csv_with("", true, &DEFAULT_STRATEGIES).strategy, None);
    }

    #[test]
    fn header_only() {
        let t = parse_csv("id,name", true);
        assert_eq!(t.headers, row(&["id", "name"]));
        assert!(t.rows.is_empty());
        assert!(!t.is_empty());
    }

    #[test]
    fn quoted_commas_survive_strict() {
        let t = parse_csv("id,name\n1,\"Smith, J\"", true);
        assert_eq!(t.rows, vec![row(&["1", "Smith, J"])]);
    }

    #[test]
    fn no_header_synthesises_columns() {
        let t = parse_csv("x,y,z\n1,2,3", false);
        assert_eq!(t.headers, row(&["col_0", "col_1", "col_2"]));
        assert_eq!(t.rows.len(), 2);
    }

    #[test]
    fn no_header_ragged_uses_first_row_width() {
        let t = parse_csv("x,y\n1\n2,3,4", false);
        assert_eq!(t.headers, row(&["col_0", "col_1"]));
        assert_eq!(
            t.rows,
            vec![row(&["x", "y"]), row(&["1", ""]), row(&["2", "3,4"])]
        );
    }

    #[test]
    fn semicolon_delimited_is_sniffed() {
        let t = parse_csv("a;b;c\n1;2;3\n4;5", true);
        assert_eq!(t.headers, row(&["a", "b", "c"]));
        assert_eq!(t.rows[0], row(&["1", "2", "3"]));
        assert_eq!(t.rows[1], row(&["4", "5", ""]));
    }

    #[test]
    fn overflow_merge_uses_sniffed_delimiter() {
        let t = parse_csv("a|b\n1|2|3", true);
        assert_eq!(t.rows, vec![row(&["1", "2|3"])]);
    }

    #[test]
    fn repair_contains_stray_quote_to_its_line() {
        // Strict reading would swallow the rest of the text into one field.
        let text = "id,note\n1,\"unterminated\n2,fine\n3,also fine";
        let t = parse_csv_with(text, true, &[ParseStrategy::Repair]).table;
        assert!(t.is_rectangular());
        assert_eq!(t.width(), 2);
        assert_eq!(t.rows.last().unwrap(), &row(&["3", "also fine"]));
    }

    #[test]
    fn default_chain_falls_back_on_stray_quote() {
        let text = "id,note\n1,\"unterminated\n2,fine\n3,also fine";
        let parsed = parse_csv_with(text, true, &DEFAULT_STRATEGIES);
        assert_eq!(parsed.strategy, Some(ParseStrategy::Repair));
        assert_eq!(parsed.table.rows.len(), 3);
        assert_eq!(parsed.table.rows[1], row(&["2", "fine"]));
        assert_eq!(parsed.table.rows[2], row(&["3", "also fine"]));
        assert_eq!(parse_csv(text, true), parsed.table);
    }

    #[test]
    fn escaped_quotes_stay_strict() {
        let parsed = parse_csv_with(
            "id,quote\n1,\"she said \"\"hi\"\"\"\n",
            true,
            &DEFAULT_STRATEGIES,
        );
        assert_eq!(parsed.strategy, Some(ParseStrategy::Strict));
        assert_eq!(parsed.table.rows, vec![row(&["1", "she said \"hi\""])]);
    }

    #[test]
    fn skip_malformed_drops_ragged_rows() {
        let parsed = parse_csv_with(
            "a,b\n1,2,3\n4,5\n6",
            true,
            &[ParseStrategy::Strict, ParseStrategy::SkipMalformed],
        );
        assert_eq!(parsed.strategy, Some(ParseStrategy::SkipMalformed));
        assert_eq!(parsed.table.rows, vec![row(&["4", "5"])]);
    }

    #[test]
    fn strict_only_chain_gives_empty_on_failure() {
        let parsed = parse_csv_with("a,b\n1,2,3", true, &[ParseStrategy::Strict]);
        assert_eq!(parsed.strategy, None);
        assert!(parsed.table.is_empty());
    }

    #[test]
    fn blank_lines_between_rows_are_ignored() {
        let t = parse_csv("a,b\n\n1,2\n\n3,4\n", true);
        assert_eq!(t.rows, vec![row(&["1", "2"]), row(&["3", "4"])]);
    }

    #[test]
    fn sniffer() {
        assert_eq!(sniff_delimiter("a,b,c"), b',');
        assert_eq!(sniff_delimiter("a;b;c"), b';');
        assert_eq!(sniff_delimiter("a\tb"), b'\t');
        assert_eq!(sniff_delimiter("a|b|c"), b'|');
        assert_eq!(sniff_delimiter("plain"), b',');
        assert_eq!(sniff_delimiter("\"x;y;z\",w"), b',');
        assert_eq!(sniff_delimiter("a;b,c"), b',');
    }

    #[test]
    fn round_trip_well_formed() {
        let text = "id,name,amount\n1,Alice,10.5\n2,\"Smith, J\",3\n";
        let t = parse_csv(text, true);
        let written = t.to_csv_string().unwrap();
        assert_eq!(written.trim_end(), text.trim_end());
        assert_eq!(parse_csv(&written, true), t);
    }

    #[test]
    fn empty_table_serialises_to_empty_string() {
        assert_eq!(Table::default().to_csv_string().unwrap(), "");
    }

    #[test]
    fn strategy_display() {
        assert_eq!(ParseStrategy::SkipMalformed.to_string(), "skip-malformed");
    }
}
