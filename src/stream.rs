//! Streaming JSON generation: emit one fragment per chunk as it completes.
//!
//! Large documents are split into many chunks and each chunk is a separate
//! model call. [`stream_fragments`] yields the cleaned response for every
//! chunk as soon as it arrives, so a caller can show partial JSON or a
//! progress bar while the rest of the document is still being processed.
//!
//! Chunks are sent strictly one after another, in document order. The
//! first failed call ends the stream: its error is the last item and no
//! further requests are made.
//!
//! [`crate::convert::generate_structured_json`] is the eager counterpart;
//! it drains this stream and merges the fragments.

use crate::error::Pdf2CsvError;
use crate::pipeline::llm::{GenerationOptions, TextGenerator};
use crate::pipeline::postprocess;
use crate::progress::ProgressCallback;
use futures::stream;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::{debug, warn};

/// One chunk's response, cleaned of fences, surrounding prose and whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// 1-based chunk index.
    pub index: usize,
    /// Number of chunks in the run.
    pub total: usize,
    pub text: String,
}

/// A boxed stream of fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment, Pdf2CsvError>> + Send>>;

/// Step label used for chunk `index` in errors and logs.
pub fn chunk_step(index: usize) -> String {
    format!("JSON generation on chunk {index}")
}

/// Send `prompts` to `generator` one at a time, yielding each fragment.
///
/// `options` is relabelled per chunk with [`chunk_step`]. `progress`, when
/// given, receives `on_chunk_start` before each call and either
/// `on_chunk_complete` or `on_chunk_error` after it.
pub fn stream_fragments<G>(
    generator: Arc<G>,
    prompts: Vec<String>,
    options: GenerationOptions,
    progress: Option<ProgressCallback>,
) -> FragmentStream
where
    G: TextGenerator + 'static,
{
    let total = prompts.len();
    let state = (prompts.into_iter().enumerate(), false);

    let s = stream::unfold(state, move |(mut remaining, failed)| {
        let generator = Arc::clone(&generator);
        let options = options.clone();
        let progress = progress.clone();
        async move {
            if failed {
                return None;
            }
            let (i, prompt) = remaining.next()?;
            let index = i + 1;

            if let Some(ref cb) = progress {
                cb.on_chunk_start(index, total);
            }
            debug!("Chunk {}/{}: sending {} chars", index, total, prompt.len());

            let opts = options.for_step(chunk_step(index));
            let item = match generator.generate(&prompt, &opts).await {
                Ok(raw) => {
                    if let Some(ref cb) = progress {
                        cb.on_chunk_complete(index, total, raw.len());
                    }
                    Ok(Fragment {
                        index,
                        total,
                        text: postprocess::clean_json_fragment(&raw),
                    })
                }
                Err(e) => {
                    warn!("Chunk {}/{} failed: {}", index, total, e);
                    if let Some(ref cb) = progress {
                        cb.on_chunk_error(index, total, &e.to_string());
                    }
                    Err(e)
                }
            };

            let failed = item.is_err();
            Some((item, (remaining, failed)))
        }
    });

    Box::pin(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ExtractionProgressCallback;
    use futures::StreamExt;
    use std::sync::Mutex;

    /// Answers `"{\"chunk\": n}"` and fails on `fail_on`.
    struct Numbered {
        fail_on: Option<usize>,
        calls: Mutex<Vec<String>>,
    }

    impl TextGenerator for Numbered {
        async fn generate(
            &self,
            _prompt: &str,
            options: &GenerationOptions,
        ) -> Result<String, Pdf2CsvError> {
            let n = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(options.step.clone());
                calls.len()
            };
            if self.fail_on == Some(n) {
                return Err(Pdf2CsvError::LlmApiError {
                    step: options.step.clone(),
                    message: "boom".into(),
                });
            }
            Ok(format!("```json\n{{\"chunk\": {n}}}\n```"))
        }
    }

    #[derive(Default)]
    struct Events(Mutex<Vec<String>>);

    impl ExtractionProgressCallback for Events {
        fn on_chunk_start(&self, index: usize, total: usize) {
            self.0.lock().unwrap().push(format!("start {index}/{total}"));
        }
        fn on_chunk_complete(&self, index: usize, _total: usize, _len: usize) {
            self.0.lock().unwrap().push(format!("done {index}"));
        }
        fn on_chunk_error(&self, index: usize, _total: usize, _error: &str) {
            self.0.lock().unwrap().push(format!("error {index}"));
        }
    }

    fn prompts(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("prompt {i}")).collect()
    }

    #[tokio::test]
    async fn yields_cleaned_fragments_in_order() {
        let g = Arc::new(Numbered {
            fail_on: None,
            calls: Mutex::new(Vec::new()),
        });
        let items: Vec<_> = stream_fragments(
            Arc::clone(&g),
            prompts(3),
            GenerationOptions::new("json", 0.1),
            None,
        )
        .collect()
        .await;

        let texts: Vec<String> = items.into_iter().map(|r| r.unwrap().text).collect();
        assert_eq!(texts, vec!["{\"chunk\": 1}", "{\"chunk\": 2}", "{\"chunk\": 3}"]);
        assert_eq!(
            *g.calls.lock().unwrap(),
            vec![chunk_step(1), chunk_step(2), chunk_step(3)]
        );
    }

    #[tokio::test]
    async fn stops_after_first_error() {
        let g = Arc::new(Numbered {
            fail_on: Some(2),
            calls: Mutex::new(Vec::new()),
        });
        let events = Arc::new(Events::default());
        let items: Vec<_> = stream_fragments(
            Arc::clone(&g),
            prompts(4),
            GenerationOptions::new("json", 0.1),
            Some(events.clone() as ProgressCallback),
        )
        .collect()
        .await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        match &items[1] {
            Err(Pdf2CsvError::LlmApiError { step, .. }) => assert_eq!(step, &chunk_step(2)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(g.calls.lock().unwrap().len(), 2, "no request after the failure");
        assert_eq!(
            *events.0.lock().unwrap(),
            vec!["start 1/4", "done 1", "start 2/4", "error 2"]
        );
    }

    #[tokio::test]
    async fn empty_prompt_list_is_an_empty_stream() {
        let g = Arc::new(Numbered {
            fail_on: None,
            calls: Mutex::new(Vec::new()),
        });
        let mut s = stream_fragments(g, Vec::new(), GenerationOptions::new("json", 0.1), None);
        assert!(s.next().await.is_none());
    }
}
