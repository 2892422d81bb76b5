//! Fragment merging: fold per-chunk JSON responses into one document.
//!
//! Each chunk is converted independently, so each response is a partial
//! view of the same document. Merging is a shallow, key-level fold: for
//! every top-level key the value from the last fragment that defines it
//! wins. Values are kept as [`serde_json::Value`] so the merge stays
//! agnostic of the downstream schema.

use crate::error::PipelineWarning;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Result of [`merge_fragments`]: merged JSON text plus what was skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    /// Merged document. Empty when there were no fragments.
    pub json: String,
    /// One warning per fragment that was left out of the merge.
    pub warnings: Vec<PipelineWarning>,
}

/// Merge ordered JSON fragments into a single JSON text.
///
/// - no fragments → `""`
/// - one fragment → returned verbatim, without a parse/serialise round trip
/// - several → parsed in order; objects are folded key by key (later wins),
///   anything unparseable or non-object is skipped with a warning, and the
///   accumulator is pretty-printed. Never fails: `{}` when nothing merged.
pub fn merge_fragments<S: AsRef<str>>(fragments: &[S]) -> MergeOutcome {
    match fragments {
        [] => return MergeOutcome::default(),
        [only] => {
            return MergeOutcome {
                json: only.as_ref().to_string(),
                warnings: Vec::new(),
            }
        }
        _ => {}
    }

    let mut merged = Map::new();
    let mut warnings = Vec::new();

    for (i, fragment) in fragments.iter().enumerate() {
        let index = i + 1;
        match serde_json::from_str::<Value>(fragment.as_ref()) {
            Ok(Value::Object(map)) => {
                debug!("Fragment {}: merging {} top-level keys", index, map.len());
                for (key, value) in map {
                    merged.insert(key, value);
                }
            }
            Ok(other) => {
                let kind = value_kind(&other);
                warn!("Fragment {}: top-level {} skipped", index, kind);
                warnings.push(PipelineWarning::FragmentNotObject {
                    index,
                    kind: kind.to_string(),
                });
            }
            Err(e) => {
                warn!("Fragment {}: invalid JSON skipped: {}", index, e);
                warnings.push(PipelineWarning::FragmentUnparseable {
                    index,
                    detail: e.to_string(),
                });
            }
        }
    }

    let json = serde_json::to_string_pretty(&Value::Object(merged))
        .unwrap_or_else(|_| String::from("{}"));

    MergeOutcome { json, warnings }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
