//! Text chunking: split extracted document text into model-sized pieces.
//!
//! Chunks are cut at the last newline inside the window, else at the last
//! space, else hard at the window edge. Lengths are counted in `char`s so
//! multi-byte text never splits inside a code point and the budget matches
//! what a caller sees when they count characters.

/// Default chunk budget in characters.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 12_000;

/// Split `text` into ordered, non-empty chunks of at most `max_chars` characters.
///
/// Each piece is trimmed of surrounding whitespace. Concatenating the chunks
/// reproduces the input in order, minus the whitespace removed at the cut
/// points. Empty or all-whitespace input yields no chunks.
///
/// A `max_chars` of zero is treated as one.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut pos = 0usize;

    while pos < text.len() {
        let rest = &text[pos..];

        // Byte offset (relative to `pos`) of the first char past the window.
        let window_end = match rest.char_indices().nth(max_chars) {
            Some((offset, _)) => offset,
            None => {
                push_trimmed(&mut chunks, rest);
                break;
            }
        };

        let window = &rest[..window_end];
        // The split char (newline or space) stays with the current piece and
        // is trimmed away; a hard split ends exactly at the window edge.
        let cut = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .map(|i| i + 1)
            .unwrap_or(window_end);

        push_trimmed(&mut chunks, &rest[..cut]);
        pos += cut;
    }

    chunks
}

fn push_trimmed(chunks: &mut Vec<String>, piece: &str) {
    let trimmed = piece.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}
