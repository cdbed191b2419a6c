use super::NO_CONTENT;
use crate::core::types::Chunk;

/// Split `text` into ordered chunks of at most `limit` characters.
///
/// Each cut prefers, in order: a paragraph break, a line break, a sentence
/// terminator followed by a space, any whitespace, and finally a hard cut at
/// `limit`. The separator stays with the chunk before the cut and trailing
/// whitespace is trimmed from each chunk, so joining the chunks gives back
/// `text` modulo whitespace at cut points. Empty input yields one
/// [`NO_CONTENT`] chunk, never zero.
pub fn chunk(text: &str, limit: usize) -> Vec<Chunk> {
    let limit = limit.max(1);
    let mut pieces: Vec<String> = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let Some(window_end) = byte_index_of_char(rest, limit) else {
            push_piece(&mut pieces, rest);
            break;
        };
        let cut = find_break(&rest[..window_end]).unwrap_or(window_end);
        push_piece(&mut pieces, &rest[..cut]);
        rest = &rest[cut..];
    }

    if pieces.is_empty() {
        pieces.push(NO_CONTENT.to_string());
    }

    let total = pieces.len();
    pieces
        .into_iter()
        .enumerate()
        .map(|(index, content)| Chunk {
            index,
            total,
            content,
        })
        .collect()
}

fn push_piece(pieces: &mut Vec<String>, piece: &str) {
    let piece = piece.trim_end();
    if !piece.trim_start().is_empty() {
        pieces.push(piece.to_string());
    }
}

/// Byte offset of the `n`th char, or `None` when `s` has at most `n` chars.
fn byte_index_of_char(s: &str, n: usize) -> Option<usize> {
    s.char_indices().nth(n).map(|(i, _)| i)
}

/// Best cut position (exclusive end, separator included) inside `window`.
/// Positions at offset 0 are skipped so every cut makes progress.
fn find_break(window: &str) -> Option<usize> {
    if let Some(i) = window.rfind("\n\n").filter(|&i| i > 0) {
        return Some(i + 2);
    }
    if let Some(i) = window.rfind('\n').filter(|&i| i > 0) {
        return Some(i + 1);
    }
    let sentence_end = [". ", "! ", "? "]
        .iter()
        .filter_map(|t| window.rfind(t))
        .filter(|&i| i > 0)
        .max();
    if let Some(i) = sentence_end {
        return Some(i + 2);
    }
    window
        .char_indices()
        .rev()
        .find(|&(i, c)| i > 0 && c.is_whitespace())
        .map(|(i, c)| i + c.len_utf8())
}
