//! Eager (whole-document) pipeline entry points.
//!
//! A run has four stages, each exposed on its own so interactive callers
//! can cache and re-run them (see [`crate::session::Session`]):
//!
//! 1. [`extract_pages`]: PDF bytes → page text
//! 2. [`suggest_context`]: first page → suggested context and relationships
//! 3. [`generate_structured_json`]: page text → one merged JSON document
//! 4. [`generate_csv_tables`]: JSON → named CSV tables
//!
//! [`convert`] and [`convert_bytes`] chain all of them with the default
//! pdfium extractor and the configured LLM provider. [`convert_with`] does
//! the same with caller-supplied implementations.
//!
//! Every function here is stateless: inputs come in as arguments, results
//! go out as return values. Any model call that fails aborts the stage with
//! a classified error; nothing is retried.

use crate::config::ExtractionConfig;
use crate::error::{Pdf2CsvError, PipelineWarning};
use crate::fewshot::FewShotExample;
use crate::output::{ConversionOutput, ConversionStats, NamedTable};
use crate::pipeline::csv_reader::parse_csv_with;
use crate::pipeline::extract::{DocumentExtractor, PdfiumExtractor, TableStrategy};
use crate::pipeline::llm::{GenerationOptions, ProviderGenerator, TextGenerator};
use crate::pipeline::{chunk, input, merge, postprocess, tables};
use crate::prompts::{self, PromptContext};
use crate::schema;
use crate::stream::stream_fragments;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Context and relationships proposed by the model from the first page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedContext {
    pub context: String,
    pub relationships: String,
}

/// Output of [`generate_structured_json`].
#[derive(Debug, Clone, PartialEq)]
pub struct JsonGeneration {
    /// Merged document; pretty-printed when schema validation is enabled.
    pub json: String,
    pub chunk_count: usize,
    /// Fragments left out of the merge.
    pub warnings: Vec<PipelineWarning>,
}

/// Output of [`generate_csv_tables`].
#[derive(Debug, Clone, PartialEq)]
pub struct CsvGeneration {
    /// Tables in the order the model emitted them.
    pub tables: Vec<NamedTable>,
    /// The model's answer exactly as received.
    pub raw_output: String,
    pub warnings: Vec<PipelineWarning>,
}

/// Caller-provided material for a full run.
#[derive(Debug, Clone, Default)]
pub struct ConversionInputs {
    /// User context. Blank `context` / `relationships` are filled from the
    /// model's suggestions unless `skip_suggestions` is set.
    pub context: PromptContext,
    pub skip_suggestions: bool,
    pub examples: Vec<FewShotExample>,
    /// Pre-rendered example CSV snippets (see [`prompts::csv_example_snippet`]).
    pub csv_snippets: Vec<String>,
}

/// Extract per-page text on the blocking thread pool.
pub async fn extract_pages<E>(
    extractor: Arc<E>,
    name: &str,
    bytes: Vec<u8>,
    strategy: TableStrategy,
) -> Result<Vec<String>, Pdf2CsvError>
where
    E: DocumentExtractor + ?Sized + 'static,
{
    let name = name.to_string();
    let pages = tokio::task::spawn_blocking(move || {
        extractor.extract_pages(&name, &bytes, strategy)
    })
    .await
    .map_err(|e| Pdf2CsvError::Internal(format!("extraction task failed: {e}")))??;

    info!("Extracted text from {} pages", pages.len());
    Ok(pages)
}

/// Ask the model for a data description and key relationships.
///
/// Only the first page is sent, truncated to
/// `config.suggestion_snippet_chars`. A blank first page makes no calls and
/// returns empty suggestions.
pub async fn suggest_context<G: TextGenerator>(
    generator: &G,
    pages: &[String],
    config: &ExtractionConfig,
) -> Result<SuggestedContext, Pdf2CsvError> {
    let first = pages.first().map(String::as_str).unwrap_or_default();
    let snippet = prompts::truncate_chars(first, config.suggestion_snippet_chars);
    if snippet.trim().is_empty() {
        debug!("First page is blank, no suggestions requested");
        return Ok(SuggestedContext::default());
    }

    let options = |step: &str| {
        GenerationOptions::new(step, config.suggestion_temperature)
            .max_tokens(Some(config.suggestion_max_tokens))
    };

    let context = generator
        .generate(
            &prompts::build_context_suggestion_prompt(snippet),
            &options("Context suggestion"),
        )
        .await?;
    let relationships = generator
        .generate(
            &prompts::build_relationships_suggestion_prompt(snippet),
            &options("Relationships suggestion"),
        )
        .await?;

    Ok(SuggestedContext {
        context: context.trim().to_string(),
        relationships: relationships.trim().to_string(),
    })
}

/// Convert the document text to one JSON document, chunk by chunk.
///
/// Pages are joined with newlines and cut into chunks of at most
/// `config.max_chunk_chars`. Chunks are sent in order; the first failed
/// call aborts the stage and every fragment received so far is dropped.
/// With `config.validate_schema` the merged document must satisfy the
/// extraction schema.
pub async fn generate_structured_json<G: TextGenerator + 'static>(
    generator: Arc<G>,
    pages: &[String],
    ctx: &PromptContext,
    examples: &[FewShotExample],
    config: &ExtractionConfig,
) -> Result<JsonGeneration, Pdf2CsvError> {
    let text = pages.join("\n");
    let chunks = chunk::chunk_text(&text, config.max_chunk_chars);
    if chunks.is_empty() {
        return Err(Pdf2CsvError::NoFragments);
    }

    let total = chunks.len();
    info!("Generating JSON from {} chunk(s)", total);
    if let Some(ref cb) = config.progress_callback {
        cb.on_generation_start(total);
    }

    let prompts: Vec<String> = chunks
        .iter()
        .enumerate()
        .map(|(i, c)| prompts::build_json_prompt(ctx, examples, c, i + 1, total))
        .collect();
    let options = GenerationOptions::new("JSON generation", config.json_temperature)
        .max_tokens(config.max_tokens)
        .json();

    let mut stream = stream_fragments(generator, prompts, options, config.progress_callback.clone());
    let mut fragments = Vec::with_capacity(total);
    while let Some(item) = stream.next().await {
        fragments.push(item?.text);
    }

    let merged = merge::merge_fragments(&fragments);
    let json = if config.validate_schema {
        schema::validate_document(&merged.json)?.to_pretty_json()?
    } else {
        merged.json
    };

    Ok(JsonGeneration {
        json,
        chunk_count: total,
        warnings: merged.warnings,
    })
}

/// Ask the model to split the JSON into the configured tables, then parse
/// every table block it returns.
///
/// No table block at all is an error carrying the raw answer. Tables that
/// needed a fallback parse, came back without rows, or were requested but
/// not returned are reported as warnings.
pub async fn generate_csv_tables<G: TextGenerator>(
    generator: &G,
    json: &str,
    ctx: &PromptContext,
    csv_snippets: &[String],
    config: &ExtractionConfig,
) -> Result<CsvGeneration, Pdf2CsvError> {
    let requested = &config.table_names;
    if let Some(ref cb) = config.progress_callback {
        cb.on_csv_start(requested.len());
    }

    let prompt = prompts::build_csv_prompt(json, requested, ctx, csv_snippets);
    let options = GenerationOptions::new("CSV generation from JSON", config.csv_temperature)
        .max_tokens(config.max_tokens);
    let raw_output = generator.generate(&prompt, &options).await?;

    let cleaned = postprocess::clean_model_output(&raw_output);
    let (blocks, mut warnings) = tables::extract_tables_with_warnings(&cleaned);
    if blocks.is_empty() {
        warn!("CSV generation returned no table blocks");
        return Err(Pdf2CsvError::NoTablesFound { raw_output });
    }

    let first_strategy = config.csv_strategies.first().copied();
    let mut parsed = Vec::with_capacity(blocks.len());
    for block in blocks {
        let body = postprocess::clean_fragment(&block.csv);
        let result = parse_csv_with(&body, true, &config.csv_strategies);

        if let Some(strategy) = result.strategy {
            if Some(strategy) != first_strategy {
                warnings.push(PipelineWarning::CsvRepaired {
                    table: block.name.clone(),
                    strategy: strategy.to_string(),
                });
            }
        }
        if result.table.rows.is_empty() {
            warnings.push(PipelineWarning::EmptyTable {
                table: block.name.clone(),
            });
        }
        if !requested.iter().any(|n| n == &block.name) {
            debug!("Table '{}' was not requested, keeping it", block.name);
        }

        parsed.push(NamedTable {
            name: block.name,
            table: result.table,
            strategy: result.strategy,
        });
    }

    for name in requested {
        if !parsed.iter().any(|t| &t.name == name) {
            warn!("Table '{}' missing from model output", name);
            warnings.push(PipelineWarning::MissingTable { table: name.clone() });
        }
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_csv_complete(parsed.len());
    }

    Ok(CsvGeneration {
        tables: parsed,
        raw_output,
        warnings,
    })
}

/// Fill blank context fields from the model's suggestions.
pub fn apply_suggestions(ctx: &PromptContext, suggested: &SuggestedContext) -> PromptContext {
    let pick = |user: &str, model: &str| {
        if user.trim().is_empty() {
            model.to_string()
        } else {
            user.to_string()
        }
    };
    PromptContext {
        context: pick(&ctx.context, &suggested.context),
        relationships: pick(&ctx.relationships, &suggested.relationships),
        ..ctx.clone()
    }
}

/// Run the whole pipeline with caller-supplied extractor and generator.
pub async fn convert_with<G, E>(
    generator: Arc<G>,
    extractor: Arc<E>,
    name: &str,
    bytes: Vec<u8>,
    inputs: &ConversionInputs,
    config: &ExtractionConfig,
) -> Result<ConversionOutput, Pdf2CsvError>
where
    G: TextGenerator + 'static,
    E: DocumentExtractor + ?Sized + 'static,
{
    let total_start = Instant::now();
    info!("Starting conversion: {}", name);

    input::check_magic(name, &bytes)?;

    // ── Stage 1: extract text ────────────────────────────────────────────
    let extraction_start = Instant::now();
    let pages = extract_pages(extractor, name, bytes, config.table_strategy).await?;
    let extraction_duration_ms = extraction_start.elapsed().as_millis() as u64;
    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_complete(pages.len());
    }

    // ── Stage 2: context suggestions ─────────────────────────────────────
    let ctx = if inputs.skip_suggestions {
        inputs.context.clone()
    } else {
        let suggested = suggest_context(&*generator, &pages, config).await?;
        apply_suggestions(&inputs.context, &suggested)
    };

    // ── Stage 3: text → JSON ─────────────────────────────────────────────
    let json_start = Instant::now();
    let generation = generate_structured_json(
        Arc::clone(&generator),
        &pages,
        &ctx,
        &inputs.examples,
        config,
    )
    .await?;
    let json_duration_ms = json_start.elapsed().as_millis() as u64;

    // ── Stage 4: JSON → CSV ──────────────────────────────────────────────
    let csv_start = Instant::now();
    let csv = generate_csv_tables(
        &*generator,
        &generation.json,
        &ctx,
        &inputs.csv_snippets,
        config,
    )
    .await?;
    let csv_duration_ms = csv_start.elapsed().as_millis() as u64;

    let mut warnings = generation.warnings;
    warnings.extend(csv.warnings);

    let stats = ConversionStats {
        page_count: pages.len(),
        chunk_count: generation.chunk_count,
        table_count: csv.tables.len(),
        extraction_duration_ms,
        json_duration_ms,
        csv_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        usage: generator.usage(),
    };

    info!(
        "Conversion complete: {} pages, {} chunks, {} tables, {}ms total",
        stats.page_count, stats.chunk_count, stats.table_count, stats.total_duration_ms
    );

    Ok(ConversionOutput {
        pages,
        json: generation.json,
        tables: csv.tables,
        warnings,
        stats,
    })
}

/// Convert in-memory PDF bytes with the pdfium extractor and the
/// configured provider.
pub async fn convert_bytes(
    name: &str,
    bytes: Vec<u8>,
    inputs: &ConversionInputs,
    config: &ExtractionConfig,
) -> Result<ConversionOutput, Pdf2CsvError> {
    let generator = Arc::new(ProviderGenerator::from_config(config)?);
    let extractor = Arc::new(PdfiumExtractor::new().with_password(config.password.clone()));
    convert_with(generator, extractor, name, bytes, inputs, config).await
}

/// Convert a PDF file or URL to CSV tables.
///
/// This is the primary entry point for the library.
///
/// # Errors
/// Any fatal error of any stage: unreadable input, not a PDF, no provider,
/// a failed model call, an invalid JSON document, or no table in the
/// model's answer.
pub async fn convert(
    input_str: impl AsRef<str>,
    inputs: &ConversionInputs,
    config: &ExtractionConfig,
) -> Result<ConversionOutput, Pdf2CsvError> {
    let resolved = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    convert_bytes(&resolved.name, resolved.bytes, inputs, config).await
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    inputs: &ConversionInputs,
    config: &ExtractionConfig,
) -> Result<ConversionOutput, Pdf2CsvError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2CsvError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_str, inputs, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::csv_reader::ParseStrategy;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned answers and records every prompt it was sent.
    struct Scripted {
        answers: Mutex<VecDeque<Result<String, Pdf2CsvError>>>,
        prompts: Mutex<Vec<(String, String)>>,
    }

    impl Scripted {
        fn new(answers: Vec<Result<String, Pdf2CsvError>>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers.into()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn steps(&self) -> Vec<String> {
            self.prompts.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
        }
    }

    impl TextGenerator for Scripted {
        async fn generate(
            &self,
            prompt: &str,
            options: &GenerationOptions,
        ) -> Result<String, Pdf2CsvError> {
            self.prompts
                .lock()
                .unwrap()
                .push((options.step.clone(), prompt.to_string()));
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Pdf2CsvError::Internal("script exhausted".into())))
        }
    }

    fn config() -> ExtractionConfig {
        ExtractionConfig::builder()
            .table_names(["Customers", "Orders"])
            .build()
            .unwrap()
    }

    const DOC: &str = r#"{"entities":[{"id":"c1","type":"customer","name":"ACME"}]}"#;

    #[tokio::test]
    async fn suggestions_are_trimmed_and_use_first_page() {
        let g = Scripted::new(vec![Ok("  Invoices.  \n".into()), Ok("\nid -> id".into())]);
        let pages = vec!["first page".to_string(), "second page".to_string()];
        let s = suggest_context(&*g, &pages, &config()).await.unwrap();
        assert_eq!(s.context, "Invoices.");
        assert_eq!(s.relationships, "id -> id");

        let prompts = g.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].1.contains("first page"));
        assert!(!prompts[0].1.contains("second page"));
    }

    #[tokio::test]
    async fn blank_first_page_skips_suggestions() {
        let g = Scripted::new(vec![]);
        let s = suggest_context(&*g, &["  ".to_string()], &config())
            .await
            .unwrap();
        assert_eq!(s, SuggestedContext::default());
        assert!(g.steps().is_empty());
    }

    #[tokio::test]
    async fn json_stage_validates_single_fragment() {
        let g = Scripted::new(vec![Ok(format!("```json\n{DOC}\n```"))]);
        let out = generate_structured_json(
            Arc::clone(&g),
            &["ACME Corp".to_string()],
            &PromptContext::default(),
            &[],
            &config(),
        )
        .await
        .unwrap();
        assert_eq!(out.chunk_count, 1);
        assert!(out.json.contains("\"type\": \"customer\""));
        assert_eq!(g.steps(), vec!["JSON generation on chunk 1"]);
    }

    #[tokio::test]
    async fn json_stage_rejects_schema_violations() {
        let g = Scripted::new(vec![Ok(r#"{"entities":[{"id":"c1"}]}"#.into())]);
        let err = generate_structured_json(g, &["x".to_string()], &PromptContext::default(), &[], &config())
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2CsvError::SchemaValidation { .. }));
    }

    #[tokio::test]
    async fn json_stage_needs_text() {
        let g = Scripted::new(vec![]);
        let err = generate_structured_json(g, &[], &PromptContext::default(), &[], &config())
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2CsvError::NoFragments));
    }

    #[tokio::test]
    async fn csv_stage_parses_blocks_and_reports_gaps() {
        let answer = "Here you go:\n\
            === START OF TABLE: Customers ===\n```csv\nid,name\nc1,\"ACME, Inc\"\n```\n=== END OF TABLE: Customers ===\n";
        let g = Scripted::new(vec![Ok(answer.into())]);
        let out = generate_csv_tables(&*g, DOC, &PromptContext::default(), &[], &config())
            .await
            .unwrap();

        assert_eq!(out.tables.len(), 1);
        let customers = &out.tables[0];
        assert_eq!(customers.name, "Customers");
        assert_eq!(customers.table.headers, vec!["id", "name"]);
        assert_eq!(customers.table.rows, vec![vec!["c1", "ACME, Inc"]]);
        assert_eq!(customers.strategy, Some(ParseStrategy::Strict));
        assert_eq!(
            out.warnings,
            vec![PipelineWarning::MissingTable { table: "Orders".into() }]
        );
        assert_eq!(out.raw_output, answer);
    }

    #[tokio::test]
    async fn csv_stage_without_markers_keeps_raw_output() {
        let g = Scripted::new(vec![Ok("id,name\n1,a".into())]);
        let err = generate_csv_tables(&*g, DOC, &PromptContext::default(), &[], &config())
            .await
            .unwrap_err();
        match err {
            Pdf2CsvError::NoTablesFound { raw_output } => assert_eq!(raw_output, "id,name\n1,a"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn user_context_wins_over_suggestions() {
        let user = PromptContext {
            context: "mine".into(),
            manual_context: "note".into(),
            ..Default::default()
        };
        let suggested = SuggestedContext {
            context: "model".into(),
            relationships: "keys".into(),
        };
        let merged = apply_suggestions(&user, &suggested);
        assert_eq!(merged.context, "mine");
        assert_eq!(merged.relationships, "keys");
        assert_eq!(merged.manual_context, "note");
    }
}
