//! Progress-callback trait for per-chunk generation events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the pipeline walks through the document. Progress is a side
//! channel only: nothing a callback does can change the result of a run.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2csv::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl ExtractionProgressCallback for Counter {
//!     fn on_chunk_complete(&self, index: usize, total: usize, response_len: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("chunk {index}/{total}: {response_len} bytes");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it moves through a run.
///
/// Chunks are processed one at a time, so events for one run never overlap,
/// but the trait is `Send + Sync` so one callback can serve several runs.
/// Every method has a no-op default.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Page text is available.
    fn on_extraction_complete(&self, page_count: usize) {
        let _ = page_count;
    }

    /// JSON generation is about to start on `total_chunks` chunks.
    fn on_generation_start(&self, total_chunks: usize) {
        let _ = total_chunks;
    }

    /// The request for chunk `index` (1-based) is about to be sent.
    fn on_chunk_start(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Chunk `index` answered with `response_len` bytes.
    fn on_chunk_complete(&self, index: usize, total: usize, response_len: usize) {
        let _ = (index, total, response_len);
    }

    /// The call for chunk `index` failed; the run stops after this event.
    fn on_chunk_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// The JSON→CSV call is about to be sent for `table_count` tables.
    fn on_csv_start(&self, table_count: usize) {
        let _ = table_count;
    }

    /// Tables are parsed; `table_count` is how many the model returned.
    fn on_csv_complete(&self, table_count: usize) {
        let _ = table_count;
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ExtractionProgressCallback for Recorder {
        fn on_generation_start(&self, total_chunks: usize) {
            self.events.lock().unwrap().push(format!("start {total_chunks}"));
        }

        fn on_chunk_complete(&self, index: usize, total: usize, _len: usize) {
            self.events.lock().unwrap().push(format!("done {index}/{total}"));
        }

        fn on_chunk_error(&self, index: usize, _total: usize, error: &str) {
            self.events.lock().unwrap().push(format!("fail {index}: {error}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_extraction_complete(3);
        cb.on_generation_start(2);
        cb.on_chunk_start(1, 2);
        cb.on_chunk_complete(1, 2, 10);
        cb.on_chunk_error(2, 2, "timeout");
        cb.on_csv_start(1);
        cb.on_csv_complete(1);
    }

    #[test]
    fn overridden_methods_receive_events() {
        let rec = Recorder::default();
        rec.on_generation_start(2);
        rec.on_chunk_start(1, 2);
        rec.on_chunk_complete(1, 2, 42);
        rec.on_chunk_error(2, 2, "429");
        assert_eq!(
            *rec.events.lock().unwrap(),
            vec!["start 2", "done 1/2", "fail 2: 429"]
        );
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_chunk_start(1, 1);
    }
}
