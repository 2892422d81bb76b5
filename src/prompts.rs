//! Prompt assembly for every LLM call in the pipeline.
//!
//! Centralising the prompts here keeps the wording in one place and lets
//! unit tests inspect exactly what the model will see without a provider.
//!
//! Every prompt follows the same layout:
//!
//! 1. task instruction
//! 2. output contract (inline schema, or the table marker format)
//! 3. labelled context sections, **only the non-empty ones**
//! 4. few-shot examples, when any
//! 5. the payload (chunk text or JSON) last
//!
//! Blank sections are omitted entirely rather than emitted as empty
//! headings, which only dilute the prompt.

use crate::fewshot::FewShotExample;
use crate::pipeline::csv_reader::parse_csv;
use crate::pipeline::tables::{end_marker, start_marker};
use crate::schema::SCHEMA_JSON;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Free-text context shared by the JSON and CSV prompts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptContext {
    /// Description of the data: domain, data types, business rules.
    pub context: String,
    /// Primary/foreign-key and hierarchical relationships between tables.
    pub relationships: String,
    /// Text of a user-supplied reference file.
    pub additional_context: String,
    /// Anything else the user typed in.
    pub manual_context: String,
}

impl PromptContext {
    /// `(label, text)` pairs for the sections that carry text.
    fn sections(&self) -> Vec<(&'static str, &str)> {
        [
            ("CONTEXT", self.context.as_str()),
            ("RELATIONSHIPS", self.relationships.as_str()),
            ("ADDITIONAL CONTEXT", self.additional_context.as_str()),
            ("MANUAL CONTEXT", self.manual_context.as_str()),
        ]
        .into_iter()
        .filter(|(_, text)| !text.trim().is_empty())
        .collect()
    }

    fn render(&self, out: &mut String) {
        for (label, text) in self.sections() {
            let _ = write!(out, "{label}:\n{}\n\n", text.trim());
        }
    }
}

const JSON_TASK: &str = "You are a data extraction expert. Convert the following text extracted \
from a PDF into a single, well-structured JSON object.";

const JSON_RULES: &str = "All required fields must be present. If a required field is missing or \
null, double-check the input and do not omit the field.\n\
Optional fields can be omitted if there is no data; when a relation is expected but cannot be \
found, include a \"missing\": true flag within the relations object.\n\
Ensure the JSON is valid and accurately captures all tables and hierarchical relationships.\n\
Answer with the JSON object only.";

/// Build the prompt converting one chunk of document text to JSON.
///
/// `index` is 1-based; `total` is the number of chunks in the document.
pub fn build_json_prompt(
    ctx: &PromptContext,
    examples: &[FewShotExample],
    chunk: &str,
    index: usize,
    total: usize,
) -> String {
    let mut p = String::with_capacity(SCHEMA_JSON.len() + chunk.len() + 1024);

    p.push_str(JSON_TASK);
    p.push_str("\nThe JSON output must strictly follow this schema:\n```json\n");
    p.push_str(SCHEMA_JSON.trim());
    p.push_str("\n```\n");
    p.push_str(JSON_RULES);
    p.push_str("\n\n");

    ctx.render(&mut p);

    if !examples.is_empty() {
        for (i, ex) in examples.iter().enumerate() {
            let n = i + 1;
            let _ = write!(
                p,
                "--- START OF EXAMPLE {n} ---\n\
                 **EXAMPLE INPUT (TEXT FROM A PDF PAGE):**\n```text\n{}\n```\n\
                 **EXAMPLE OUTPUT (THE DESIRED JSON):**\n{}\n\
                 --- END OF EXAMPLE {n} ---\n",
                ex.source_text.trim(),
                ex.target_output.trim()
            );
        }
        p.push_str(
            "Now, apply the same logic and structure from these example(s) to the real input below.\n\n",
        );
    }

    let _ = write!(p, "PDF TEXT CHUNK {index}/{total}:\n```text\n{chunk}\n```");
    p
}

/// Build the prompt converting the merged JSON into named CSV tables.
pub fn build_csv_prompt(
    json_text: &str,
    table_names: &[String],
    ctx: &PromptContext,
    csv_snippets: &[String],
) -> String {
    let mut p = String::with_capacity(json_text.len() + 2048);

    p.push_str(
        "You are a data transformation expert. Your task is to convert the provided JSON data \
         into multiple, distinct, relational CSV tables as specified.\n",
    );
    let _ = writeln!(p, "You must generate exactly {} CSV table(s).", table_names.len());
    let _ = writeln!(p, "The required table names are: {}.", table_names.join(", "));
    p.push_str(
        "Use the provided context, relationships, and CSV examples to determine the correct \
         columns and data for each table.\n\n",
    );

    p.push_str("Follow these output instructions precisely:\n");
    let _ = writeln!(
        p,
        "1. For each table, start with a header line: `{}`",
        start_marker("[TableName]")
    );
    p.push_str(
        "2. Then, provide the CSV data for that table, with a header row and comma-separated values. \
         Quote any value that contains a comma.\n",
    );
    let _ = writeln!(
        p,
        "3. End each table's data with a footer line: `{}`",
        end_marker("[TableName]")
    );
    p.push_str("4. Use each table name exactly as given, on both the header and the footer line.\n");
    p.push_str("5. Ensure the data is properly normalized across the tables as per the relational schema description.\n\n");

    ctx.render(&mut p);

    let snippets: Vec<&str> = csv_snippets
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if !snippets.is_empty() {
        p.push_str("CSV EXAMPLES:\n");
        for s in snippets {
            p.push_str(s);
            p.push('\n');
        }
        p.push('\n');
    }

    let _ = write!(p, "JSON DATA TO TRANSFORM:\n```json\n{json_text}\n```");
    p
}

/// Prompt asking the model to describe the data on the first page.
pub fn build_context_suggestion_prompt(snippet: &str) -> String {
    format!(
        "Based on the following extracted table data, write a detailed prompt describing the \
         overall context, data types, and business rules.\n\n{snippet}"
    )
}

/// Prompt asking the model for plausible key relationships on the first page.
pub fn build_relationships_suggestion_prompt(snippet: &str) -> String {
    format!(
        "Using the same extracted table data, describe plausible primary/foreign key \
         relationships and hierarchical links in detail.\n\n{snippet}"
    )
}

/// Summarise an example CSV as its header and first data row.
///
/// Returns `None` when the text holds no table at all.
pub fn csv_example_snippet(label: &str, csv_text: &str) -> Option<String> {
    let table = parse_csv(csv_text, true);
    if table.is_empty() {
        return None;
    }
    let first_row = table.rows.first().map(|r| r.join(", ")).unwrap_or_default();
    Some(format!(
        "Example for Table '{label}':\nHeaders: {}\nFirst row: {first_row}\n",
        table.headers.join(", ")
    ))
}

/// First `max_chars` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}
