//! Post-processing: deterministic cleanup of raw model responses.
//!
//! Even when asked for bare JSON or bare marker-delimited CSV, models
//! routinely:
//!
//! - wrap the answer in ```` ```json ... ``` ```` fences,
//! - answer with Windows-style `\r\n` line endings,
//! - prepend a byte-order mark or sprinkle zero-width spaces,
//! - introduce the JSON with a sentence (`Here is the JSON:`).
//!
//! None of these change the meaning of the answer, but each one breaks a
//! strict parser: `serde_json` rejects the fence, the table-marker regex
//! misses a `\r` before the newline. These rules run before parsing so the
//! parsers themselves stay strict and simple.
//!
//! ## Rule Order
//!
//! Invisible characters go first (a BOM in front of the fence hides it),
//! then line endings (the fence regex expects `\n`), then the fence.
//! Only characters that never carry meaning are removed: ZWNJ, ZWJ and the
//! soft hyphen are content in Persian, Indic and emoji text and are kept.
//! Leading prose is cut last, and only from JSON fragments that do not
//! parse as they stand.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Clean one chunk's JSON response before it is merged.
pub fn clean_fragment(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = normalise_line_endings(&s);
    let s = strip_outer_fence(&s);
    s.trim().to_string()
}

/// [`clean_fragment`], then cut any prose around the JSON object.
///
/// When the cleaned text does not parse, the span from the first `{` to
/// the last `}` is used instead, provided that span parses. Otherwise the
/// cleaned text is returned unchanged for the merger to report.
pub fn clean_json_fragment(input: &str) -> String {
    let s = clean_fragment(input);
    if parses(&s) {
        return s;
    }
    match (s.find('{'), s.rfind('}')) {
        (Some(start), Some(end)) if start < end && parses(&s[start..=end]) => {
            s[start..=end].to_string()
        }
        _ => s,
    }
}

fn parses(s: &str) -> bool {
    serde_json::from_str::<Value>(s).is_ok()
}

/// Clean the JSON→CSV response before table markers are located.
///
/// Only the outer fence is removed. A fence the model put around a single
/// table sits between that table's markers; run [`clean_fragment`] on the
/// extracted block to remove it.
pub fn clean_model_output(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = normalise_line_endings(&s);
    strip_outer_fence(&s)
}

// ── Rule 1: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(['\u{200B}', '\u{FEFF}', '\u{2060}'], "")
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Strip one outer code fence ──────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\n(.*?)\n?```\s*$").expect("valid fence regex")
});

fn strip_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fence() {
        let input = "```json\n{\"a\": 1}\n```";
        assert_eq!(clean_fragment(input), "{\"a\": 1}");
    }

    #[test]
    fn strips_bare_fence() {
        assert_eq!(strip_outer_fence("```\nx,y\n1,2\n```"), "x,y\n1,2");
    }

    #[test]
    fn unfenced_passthrough() {
        assert_eq!(clean_fragment("  {\"a\": 1}\n"), "{\"a\": 1}");
    }

    #[test]
    fn inner_fences_are_kept() {
        let input = "intro\n```json\n{}\n```\noutro";
        assert_eq!(strip_outer_fence(input), input);
    }

    #[test]
    fn normalises_crlf_and_bom() {
        let input = "\u{FEFF}```json\r\n{\"a\":\r\n1}\r\n```\r\n";
        assert_eq!(clean_fragment(input), "{\"a\":\n1}");
    }

    #[test]
    fn model_output_keeps_markers() {
        let input = "```\r\n=== START OF TABLE: T ===\r\na\r\n=== END OF TABLE: T ===\r\n```";
        assert_eq!(
            clean_model_output(input),
            "=== START OF TABLE: T ===\na\n=== END OF TABLE: T ==="
        );
    }

    #[test]
    fn remove_invisible() {
        let input = "\u{FEFF}hello\u{200B}world\u{2060}foo";
        assert_eq!(remove_invisible_chars(input), "helloworldfoo");
    }

    #[test]
    fn joiners_and_soft_hyphens_survive() {
        let persian = "name\nمی\u{200C}خواهم";
        assert_eq!(clean_fragment(persian), persian);

        let family = "\u{1F468}\u{200D}\u{1F469}\u{200D}\u{1F467}";
        assert_eq!(clean_fragment(family), family);
        assert_eq!(clean_fragment("co\u{00AD}operate"), "co\u{00AD}operate");
    }

    #[test]
    fn json_fragment_drops_leading_prose() {
        let input = "Here is the JSON:\n```json\n{\"entities\": []}\n```\nLet me know!";
        assert_eq!(clean_json_fragment(input), "{\"entities\": []}");
    }

    #[test]
    fn json_fragment_keeps_valid_json_untouched() {
        let input = "```json\n{\"note\": \"see {x}\"}\n```";
        assert_eq!(clean_json_fragment(input), "{\"note\": \"see {x}\"}");
    }

    #[test]
    fn json_fragment_without_object_is_returned_cleaned() {
        assert_eq!(clean_json_fragment("  sorry, no data \n"), "sorry, no data");
        assert_eq!(clean_json_fragment("oops {not json}"), "oops {not json}");
    }
}
