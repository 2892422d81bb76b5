//! Delimited-table parsing: find named table blocks in model output.
//!
//! The JSON→CSV prompt asks the model to wrap every table in
//!
//! ```text
//! === START OF TABLE: <name> ===
//! <csv>
//! === END OF TABLE: <name> ===
//! ```
//!
//! A block only closes on an end marker carrying the byte-identical name,
//! so `START: Orders` … `END: Customers` never pairs by accident. The
//! `regex` crate has no back-references, so the regex locates start markers
//! and the matching end marker is found by exact string search.

use crate::error::PipelineWarning;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// One named table region of the model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBlock {
    /// Table name, trimmed of surrounding whitespace.
    pub name: String,
    /// Raw CSV text between the marker lines.
    pub csv: String,
}

/// Build the start marker line for `name`.
pub fn start_marker(name: &str) -> String {
    format!("=== START OF TABLE: {name} ===")
}

/// Build the end marker line for `name`.
pub fn end_marker(name: &str) -> String {
    format!("=== END OF TABLE: {name} ===")
}

static RE_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"=== START OF TABLE: ([^\n]*?) ===[ \t]*\n").expect("valid start-marker regex")
});

/// Extract every well-formed table block, in document order.
///
/// Returns an empty vector when no start marker has a matching end marker;
/// callers must treat that as a failed generation rather than "zero tables".
/// When the same name appears twice, the block keeps its first position and
/// takes the later content.
pub fn extract_tables(text: &str) -> Vec<TableBlock> {
    extract_tables_with_warnings(text).0
}

/// Same as [`extract_tables`], also reporting duplicate table names.
pub fn extract_tables_with_warnings(text: &str) -> (Vec<TableBlock>, Vec<PipelineWarning>) {
    let mut blocks: Vec<TableBlock> = Vec::new();
    let mut warnings = Vec::new();
    let mut pos = 0usize;

    while let Some(caps) = RE_START.captures_at(text, pos) {
        let Some(whole) = caps.get(0) else { break };
        let raw_name = &caps[1];
        let body_start = whole.end();
        let end = end_marker(raw_name);

        // The end marker normally follows a newline; an empty table can put
        // it straight after the start line.
        let located = if text[body_start..].starts_with(&end) {
            Some((body_start, body_start + end.len()))
        } else {
            text[body_start..]
                .find(&format!("\n{end}"))
                .map(|i| (body_start + i, body_start + i + 1 + end.len()))
        };

        let Some((body_end, after_end)) = located else {
            debug!("Table '{}': start marker without matching end", raw_name.trim());
            pos = whole.end();
            continue;
        };

        let name = raw_name.trim().to_string();
        let csv = text[body_start..body_end].to_string();

        match blocks.iter_mut().find(|b| b.name == name) {
            Some(existing) => {
                warn!("Table '{}': duplicate block, keeping the later one", name);
                warnings.push(PipelineWarning::DuplicateTable { table: name });
                existing.csv = csv;
            }
            None => blocks.push(TableBlock { name, csv }),
        }

        pos = after_end;
    }

    (blocks, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_block() {
        let text = "=== START OF TABLE: T1 ===\na,b\n1,2\n=== END OF TABLE: T1 ===";
        assert_eq!(
            extract_tables(text),
            vec![TableBlock {
                name: "T1".into(),
                csv: "a,b\n1,2".into()
            }]
        );
    }

    #[test]
    fn mismatched_names_do_not_pair() {
        let text = "=== START OF TABLE: T1 ===\na,b\n1,2\n=== END OF TABLE: T2 ===";
        assert!(extract_tables(text).is_empty());
    }

    #[test]
    fn names_are_case_sensitive() {
        let text = "=== START OF TABLE: orders ===\na\n=== END OF TABLE: Orders ===";
        assert!(extract_tables(text).is_empty());
    }

    #[test]
    fn multiple_blocks_with_chatter() {
        let text = "Here are your tables:\n\
            === START OF TABLE: Invoices ===\n\
            id,total\n1,10\n\
            === END OF TABLE: Invoices ===\n\
            \n\
            Some commentary.\n\
            === START OF TABLE: Lines ===\n\
            invoice_id,sku\n1,A\n\
            === END OF TABLE: Lines ===\n";
        let blocks = extract_tables(text);
        let names: Vec<&str> = blocks.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["Invoices", "Lines"]);
        assert_eq!(blocks[1].csv, "invoice_id,sku\n1,A");
    }

    #[test]
    fn names_are_trimmed() {
        let text = "=== START OF TABLE:  Padded  ===\nx\n1\n=== END OF TABLE:  Padded  ===";
        let blocks = extract_tables(text);
        assert_eq!(blocks[0].name, "Padded");
    }

    #[test]
    fn unclosed_block_does_not_swallow_next() {
        let text = "=== START OF TABLE: Broken ===\na\n1\n\
            === START OF TABLE: Good ===\nb\n2\n=== END OF TABLE: Good ===";
        let blocks = extract_tables(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].name, "Good");
        assert_eq!(blocks[0].csv, "b\n2");
    }

    #[test]
    fn empty_block() {
        let text = "=== START OF TABLE: Empty ===\n=== END OF TABLE: Empty ===";
        let blocks = extract_tables(text);
        assert_eq!(blocks[0].csv, "");
    }

    #[test]
    fn duplicate_name_keeps_position_takes_last_content() {
        let text = "=== START OF TABLE: A ===\nfirst\n=== END OF TABLE: A ===\n\
            === START OF TABLE: B ===\nb\n=== END OF TABLE: B ===\n\
            === START OF TABLE: A ===\nsecond\n=== END OF TABLE: A ===";
        let (blocks, warnings) = extract_tables_with_warnings(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].name, "A");
        assert_eq!(blocks[0].csv, "second");
        assert_eq!(
            warnings,
            vec![PipelineWarning::DuplicateTable { table: "A".into() }]
        );
    }

    #[test]
    fn no_markers() {
        assert!(extract_tables("id,name\n1,x").is_empty());
        assert!(extract_tables("").is_empty());
    }

    #[test]
    fn markers_roundtrip_through_builders() {
        let text = format!("{}\nq\n{}", start_marker("Z"), end_marker("Z"));
        assert_eq!(extract_tables(&text)[0].csv, "q");
    }
}
