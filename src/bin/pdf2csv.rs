//! CLI binary for edgequake-pdf2csv.
//!
//! A thin shim over the library crate: maps CLI flags to
//! `ExtractionConfig`, runs the pipeline stage by stage and writes one CSV
//! file per table.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2csv::pipeline::input;
use edgequake_pdf2csv::prompts::csv_example_snippet;
use edgequake_pdf2csv::{
    extract_pages, generate_csv_tables, generate_structured_json, load_examples, suggest_context,
    write_tables, ConversionOutput, ConversionStats, DocumentExtractor, ExtractionConfig,
    ExtractionProgressCallback, FewShotExample, ParseStrategy, PdfiumExtractor, Pdf2CsvError,
    ProgressCallback, PromptContext, ProviderGenerator, TableStrategy, TextGenerator,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner while the PDF is read and the
/// CSV call runs, a bar while chunks are converted to JSON.
struct CliProgressCallback {
    bar: ProgressBar,
    chunk_started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        Self::spin(&bar, "Preparing", "Reading PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            chunk_started: Mutex::new(None),
        })
    }

    fn spin(bar: &ProgressBar, prefix: &'static str, msg: &'static str) {
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix(prefix);
        bar.set_message(msg);
    }

    fn note(&self, line: String) {
        self.bar.println(line);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn chunk_elapsed(&self) -> f64 {
        self.chunk_started
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_complete(&self, page_count: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracted text from {page_count} pages"))
        ));
        Self::spin(&self.bar, "Context", "Asking for suggestions…");
    }

    fn on_generation_start(&self, total_chunks: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} chunks  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_chunks as u64);
        self.bar.set_position(0);
        self.bar.set_style(style);
        self.bar.set_prefix("JSON");
        self.bar.reset_eta();
    }

    fn on_chunk_start(&self, index: usize, _total: usize) {
        if let Ok(mut t) = self.chunk_started.lock() {
            *t = Some(Instant::now());
        }
        self.bar.set_message(format!("chunk {index}"));
    }

    fn on_chunk_complete(&self, index: usize, total: usize, response_len: usize) {
        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            index,
            total,
            dim(&format!("{response_len:>6} chars")),
            dim(&format!("{:.1}s", self.chunk_elapsed())),
        ));
        self.bar.inc(1);
    }

    fn on_chunk_error(&self, index: usize, total: usize, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            let mut s: String = error.chars().take(79).collect();
            s.push('\u{2026}');
            s
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {}  {}",
            red("✗"),
            index,
            total,
            red(&msg),
            dim(&format!("{:.1}s", self.chunk_elapsed())),
        ));
    }

    fn on_csv_start(&self, table_count: usize) {
        Self::spin(&self.bar, "CSV", "Splitting JSON into tables…");
        self.bar
            .println(format!("{} Requesting {table_count} table(s)", cyan("◆")));
    }

    fn on_csv_complete(&self, table_count: usize) {
        self.bar.println(format!(
            "{} {} table(s) returned",
            green("✔"),
            bold(&table_count.to_string())
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One table, written to ./out/Table1.csv
  pdf2csv invoices.pdf

  # Several named tables into a directory
  pdf2csv invoices.pdf -t Invoices -t InvoiceLines -t Customers -o tables/

  # Describe the data yourself instead of asking the model
  pdf2csv --no-suggest --context "Monthly invoices, amounts in EUR" \
          --relationships @keys.txt report.pdf

  # Few-shot examples: dir with name.pdf + name.json pairs
  pdf2csv --examples-dir samples/ --max-examples 2 report.pdf

  # Keep the merged JSON, print the run summary as JSON
  pdf2csv --save-json report.json --json report.pdf > summary.json

  # Convert from URL
  pdf2csv https://example.org/annual-report.pdf -t Segments

TEXT ARGUMENTS:
  --context, --relationships and --manual-context take text, or @path to
  read the text from a file.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium

SETUP:
  1. Set API key:     export OPENAI_API_KEY=sk-...
  2. Convert:         pdf2csv document.pdf -t Orders -o out/
"#;

/// Extract tables from PDF files and URLs into relational CSV using LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2csv",
    version,
    about = "Extract tables from PDF files and URLs into relational CSV using LLMs",
    long_about = "Extract the tabular content of PDF documents (local files or URLs) into up to \
five normalized, relational CSV tables. The text is converted to a validated JSON document of \
entities and relationships, then split into the tables you name. Supports OpenAI, Anthropic, \
Google Gemini, Azure OpenAI, and any OpenAI-compatible endpoint (Ollama, vLLM, LiteLLM, etc.).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Directory receiving one <table>.csv per table.
    #[arg(short, long, env = "PDF2CSV_OUT_DIR", default_value = "out")]
    out_dir: PathBuf,

    /// Table name; repeat for several tables (1–5).
    #[arg(short = 't', long = "table", env = "PDF2CSV_TABLES", value_delimiter = ',')]
    tables: Vec<String>,

    /// Description of the data (text or @file).
    #[arg(long, env = "PDF2CSV_CONTEXT")]
    context: Option<String>,

    /// Key and hierarchy relationships between tables (text or @file).
    #[arg(long, env = "PDF2CSV_RELATIONSHIPS")]
    relationships: Option<String>,

    /// Free-form extra instructions (text or @file).
    #[arg(long, env = "PDF2CSV_MANUAL_CONTEXT")]
    manual_context: Option<String>,

    /// Reference file added to the prompts; a .pdf is run through text extraction.
    #[arg(long, env = "PDF2CSV_ADDITIONAL_CONTEXT")]
    additional_context: Option<PathBuf>,

    /// Directory of few-shot examples (name.pdf next to name.json).
    #[arg(long, env = "PDF2CSV_EXAMPLES_DIR")]
    examples_dir: Option<PathBuf>,

    /// Most examples taken from --examples-dir.
    #[arg(long, env = "PDF2CSV_MAX_EXAMPLES", default_value_t = 3)]
    max_examples: usize,

    /// Single example PDF; needs --example-json.
    #[arg(long, requires = "example_json")]
    example_pdf: Option<PathBuf>,

    /// Desired JSON output for --example-pdf.
    #[arg(long, requires = "example_pdf")]
    example_json: Option<PathBuf>,

    /// Example CSV for a table, as NAME=PATH; repeatable.
    #[arg(long = "example-csv", value_name = "NAME=PATH")]
    example_csv: Vec<String>,

    /// Do not ask the model for context/relationship suggestions.
    #[arg(long, env = "PDF2CSV_NO_SUGGEST")]
    no_suggest: bool,

    /// Skip JSON schema validation of the merged document.
    #[arg(long, env = "PDF2CSV_NO_VALIDATE")]
    no_validate: bool,

    /// Table-detection hint for text extraction.
    #[arg(long, env = "PDF2CSV_STRATEGY", value_enum, default_value = "auto")]
    strategy: StrategyArg,

    /// CSV parse strategies, tried in order.
    #[arg(long = "csv-strategy", env = "PDF2CSV_CSV_STRATEGY", value_enum,
          value_delimiter = ',', default_values = ["strict", "repair"])]
    csv_strategies: Vec<CsvStrategyArg>,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2CSV_PASSWORD")]
    password: Option<String>,

    /// Largest chunk of text per JSON call, in characters.
    #[arg(long, env = "PDF2CSV_MAX_CHUNK_CHARS", default_value_t = 12_000)]
    max_chunk_chars: usize,

    /// Max LLM output tokens per call.
    #[arg(long, env = "PDF2CSV_MAX_TOKENS")]
    max_tokens: Option<usize>,

    /// Write the merged JSON document to this file.
    #[arg(long, env = "PDF2CSV_SAVE_JSON")]
    save_json: Option<PathBuf>,

    /// Print the run result (JSON, tables, warnings, stats) as JSON on stdout.
    #[arg(long, env = "PDF2CSV_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2CSV_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2CSV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2CSV_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2CSV_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-call LLM timeout in seconds (no limit when unset).
    #[arg(long, env = "PDF2CSV_API_TIMEOUT")]
    api_timeout: Option<u64>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum StrategyArg {
    Auto,
    Lattice,
    Matrix,
}

impl From<StrategyArg> for TableStrategy {
    fn from(v: StrategyArg) -> Self {
        match v {
            StrategyArg::Auto => TableStrategy::Auto,
            StrategyArg::Lattice => TableStrategy::Lattice,
            StrategyArg::Matrix => TableStrategy::Matrix,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum CsvStrategyArg {
    Strict,
    Repair,
    SkipMalformed,
}

impl From<CsvStrategyArg> for ParseStrategy {
    fn from(v: CsvStrategyArg) -> Self {
        match v {
            CsvStrategyArg::Strict => ParseStrategy::Strict,
            CsvStrategyArg::Repair => ParseStrategy::Repair,
            CsvStrategyArg::SkipMalformed => ParseStrategy::SkipMalformed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar carries the user-facing feedback; library logs
    // would only interleave with it.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress = show_progress.then(CliProgressCallback::new);
    let result = run(&cli, progress.clone()).await;
    if let Some(ref p) = progress {
        p.finish();
    }

    if let Err(ref e) = result {
        report_failure(e);
    }
    result
}

async fn run(cli: &Cli, progress: Option<Arc<CliProgressCallback>>) -> Result<()> {
    let total_start = Instant::now();
    let callback = progress.clone().map(|p| p as ProgressCallback);
    let config = build_config(cli, callback)?;

    let extractor = Arc::new(PdfiumExtractor::new().with_password(cli.password.clone()));
    let generator = Arc::new(ProviderGenerator::from_config(&config)?);

    // ── Stage 1: input + text ────────────────────────────────────────────
    let resolved = input::resolve_input(&cli.input, config.download_timeout_secs).await?;
    let extraction_start = Instant::now();
    let pages = extract_pages(
        Arc::clone(&extractor),
        &resolved.name,
        resolved.bytes,
        config.table_strategy,
    )
    .await?;
    let extraction_duration_ms = extraction_start.elapsed().as_millis() as u64;
    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_complete(pages.len());
    }

    // ── Stage 2: prompt material ─────────────────────────────────────────
    let mut ctx = PromptContext {
        context: text_arg(cli.context.as_deref())?,
        relationships: text_arg(cli.relationships.as_deref())?,
        additional_context: additional_context(cli, &*extractor)?,
        manual_context: text_arg(cli.manual_context.as_deref())?,
    };
    let examples = few_shot_examples(cli, &*extractor)?;
    let csv_snippets = csv_snippets(&cli.example_csv)?;

    if !cli.no_suggest {
        let suggested = suggest_context(&*generator, &pages, &config)
            .await
            .context("Context suggestion failed")?;
        if ctx.context.trim().is_empty() {
            ctx.context = suggested.context;
        }
        if ctx.relationships.trim().is_empty() {
            ctx.relationships = suggested.relationships;
        }
    }

    // ── Stage 3: JSON ────────────────────────────────────────────────────
    let json_start = Instant::now();
    let generation =
        generate_structured_json(Arc::clone(&generator), &pages, &ctx, &examples, &config).await?;
    let json_duration_ms = json_start.elapsed().as_millis() as u64;

    if let Some(ref path) = cli.save_json {
        std::fs::write(path, &generation.json)
            .with_context(|| format!("Failed to write JSON to {}", path.display()))?;
    }

    // ── Stage 4: CSV ─────────────────────────────────────────────────────
    let csv_start = Instant::now();
    let csv = generate_csv_tables(
        &*generator,
        &generation.json,
        &ctx,
        &csv_snippets,
        &config,
    )
    .await?;
    let csv_duration_ms = csv_start.elapsed().as_millis() as u64;

    let written = write_tables(&cli.out_dir, &csv.tables)?;

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

    if let Some(ref p) = progress {
        for w in &warnings {
            p.note(format!("  {} {}", yellow("⚠"), w));
        }
        p.finish();
    } else if !cli.quiet {
        for w in &warnings {
            eprintln!("warning: {w}");
        }
    }

    if cli.json {
        let output = ConversionOutput {
            pages,
            json: generation.json,
            tables: csv.tables,
            warnings,
            stats,
        };
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        for path in &written {
            eprintln!("  {} {}", green("→"), bold(&path.display().to_string()));
        }
        eprintln!(
            "{}  {} pages  {} chunks  {} tables  {}ms",
            green("✔"),
            stats.page_count,
            stats.chunk_count,
            stats.table_count,
            stats.total_duration_ms,
        );
        eprintln!(
            "   {} calls  /  {} tokens in  /  {} tokens out",
            dim(&stats.usage.calls.to_string()),
            dim(&stats.usage.input_tokens.to_string()),
            dim(&stats.usage.output_tokens.to_string()),
        );
    }

    Ok(())
}

/// Print the category-specific hint, and the raw model answer when no
/// table could be found in it.
fn report_failure(e: &anyhow::Error) {
    let Some(err) = e.downcast_ref::<Pdf2CsvError>() else {
        return;
    };
    if let Pdf2CsvError::NoTablesFound { raw_output } = err {
        eprintln!("{}", bold("Raw model output:"));
        eprintln!("{}", dim(raw_output));
    }
    if let Some(hint) = err.remediation() {
        eprintln!("{} {}", cyan("hint:"), hint);
    }
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let tables = if cli.tables.is_empty() {
        vec!["Table1".to_string()]
    } else {
        cli.tables.clone()
    };

    let mut builder = ExtractionConfig::builder()
        .table_names(tables)
        .max_chunk_chars(cli.max_chunk_chars)
        .table_strategy(cli.strategy.into())
        .csv_strategies(cli.csv_strategies.iter().map(|&s| s.into()).collect())
        .validate_schema(!cli.no_validate)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref m) = cli.model {
        builder = builder.model(m.clone());
    }
    if let Some(ref p) = cli.provider {
        builder = builder.provider_name(p.clone());
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(n) = cli.max_tokens {
        builder = builder.max_tokens(n);
    }
    if let Some(secs) = cli.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// `@path` reads the file; anything else is the text itself.
fn text_arg(arg: Option<&str>) -> Result<String> {
    match arg {
        None => Ok(String::new()),
        Some(s) => match s.strip_prefix('@') {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read text from {path}")),
            None => Ok(s.to_string()),
        },
    }
}

fn additional_context(cli: &Cli, extractor: &dyn DocumentExtractor) -> Result<String> {
    let Some(ref path) = cli.additional_context else {
        return Ok(String::new());
    };
    let is_pdf = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()));
    }

    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = display_name(path);
    input::check_magic(&name, &bytes)?;
    let pages = tokio::task::block_in_place(|| {
        extractor.extract_pages(&name, &bytes, TableStrategy::Auto)
    })?;
    Ok(pages.join("\n"))
}

fn few_shot_examples(cli: &Cli, extractor: &dyn DocumentExtractor) -> Result<Vec<FewShotExample>> {
    let mut examples = Vec::new();

    if let (Some(pdf), Some(json)) = (&cli.example_pdf, &cli.example_json) {
        let bytes = std::fs::read(pdf).with_context(|| format!("Failed to read {}", pdf.display()))?;
        let target = std::fs::read_to_string(json)
            .with_context(|| format!("Failed to read {}", json.display()))?;
        let name = display_name(pdf);
        let example = tokio::task::block_in_place(|| {
            FewShotExample::from_pdf(extractor, &name, &bytes, target)
        })?;
        examples.push(example);
    }

    if let Some(ref dir) = cli.examples_dir {
        let remaining = cli.max_examples.saturating_sub(examples.len());
        let loaded = tokio::task::block_in_place(|| load_examples(dir, remaining, extractor))?;
        examples.extend(loaded);
    }

    Ok(examples)
}

/// Parse `--example-csv NAME=PATH` pairs into prompt snippets.
fn csv_snippets(args: &[String]) -> Result<Vec<String>> {
    let mut snippets = Vec::with_capacity(args.len());
    for arg in args {
        let (name, path) = arg
            .split_once('=')
            .with_context(|| format!("--example-csv expects NAME=PATH, got '{arg}'"))?;
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read example CSV {path}"))?;
        match csv_example_snippet(name.trim(), &text) {
            Some(s) => snippets.push(s),
            None => tracing::warn!("Example CSV {} holds no table, ignored", path),
        }
    }
    Ok(snippets)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
