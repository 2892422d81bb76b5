//! Pipeline stages for PDF-to-CSV conversion.
//!
//! Each submodule implements exactly one transformation step, so each can
//! be tested on its own and the model-facing stages can be driven with
//! scripted fakes.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ chunk ──▶ llm ──▶ postprocess ──▶ merge
//! (URL/path) (pdfium)  (≤N chars) (JSON)   (cleanup)     (one doc)
//!
//! merged JSON ──▶ llm ──▶ postprocess ──▶ tables ──▶ csv_reader
//!                 (CSV)    (cleanup)      (markers)   (parse/repair)
//! ```
//!
//! 1. [`input`]: read the user-supplied path or download the URL
//! 2. [`extract`]: per-page text; blocking, so it runs in `spawn_blocking`
//! 3. [`chunk`]: split the joined text at line boundaries
//! 4. [`llm`]: the only stage with network I/O; no retries
//! 5. [`postprocess`]: strip fences and invisible characters
//! 6. [`merge`]: fold per-chunk JSON fragments key by key
//! 7. [`tables`]: cut the CSV answer into named blocks
//! 8. [`csv_reader`]: parse each block, falling back to repair strategies

pub mod chunk;
pub mod csv_reader;
pub mod extract;
pub mod input;
pub mod llm;
pub mod merge;
pub mod postprocess;
pub mod tables;
