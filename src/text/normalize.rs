use regex::Regex;
use std::sync::OnceLock;

/// Appended to text that was cut at `max_text_length`.
pub const TRUNCATION_MARKER: &str = "\n\n[... content truncated]";

/// Smallest cap that still keeps one character of content next to the
/// full marker.
pub const MIN_TEXT_LENGTH: usize = TRUNCATION_MARKER.len() + 1;

static BLANK_RUNS: OnceLock<Regex> = OnceLock::new();
static LINE_ENDINGS: OnceLock<Regex> = OnceLock::new();

fn blank_runs() -> &'static Regex {
    BLANK_RUNS.get_or_init(|| Regex::new(r"\n{3,}").expect("valid blank-run regex"))
}

fn line_endings() -> &'static Regex {
    LINE_ENDINGS.get_or_init(|| Regex::new(r"\r\n?").expect("valid line-ending regex"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    pub text: String,
    pub truncated: bool,
    /// Character count after whitespace collapsing, before truncation.
    pub original_chars: usize,
}

/// Collapse 3+ newlines to 2, trim, and cap at `max_chars` characters.
///
/// The result never exceeds `max_chars`. When it had to be cut, the tail is
/// [`TRUNCATION_MARKER`] (or as much of it as fits).
pub fn normalize(raw: &str, max_chars: usize) -> NormalizedText {
    let unix = line_endings().replace_all(raw, "\n");
    let collapsed = blank_runs().replace_all(&unix, "\n\n");
    let trimmed = collapsed.trim();
    let original_chars = trimmed.chars().count();

    if original_chars <= max_chars {
        return NormalizedText {
            text: trimmed.to_string(),
            truncated: false,
            original_chars,
        };
    }

    let marker_chars = TRUNCATION_MARKER.chars().count();
    let text = if max_chars <= marker_chars {
        TRUNCATION_MARKER.trim_start().chars().take(max_chars).collect()
    } else {
        let keep: String = trimmed.chars().take(max_chars - marker_chars).collect();
        let mut text = keep.trim_end().to_string();
        text.push_str(TRUNCATION_MARKER);
        text
    };

    NormalizedText {
        text,
        truncated: true,
        original_chars,
    }
}
