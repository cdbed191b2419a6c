use super::{FailureReport, SuccessReport};
use crate::core::types::Chunk;
use serde::Serialize;

/// Most chat sinks cap a message near 2000 characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;
const MAX_TITLE_CHARS: usize = 200;
const MAX_ERROR_CHARS: usize = 1200;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AllowedMentions {
    pub parse: Vec<String>,
}

/// JSON body understood by Discord-style webhooks.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WebhookMessage {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Empty `parse` list: scraped text must never ping anyone.
    pub allowed_mentions: AllowedMentions,
}

impl WebhookMessage {
    pub fn new(content: String, username: Option<&str>) -> Self {
        Self {
            content: clip(&content, MAX_MESSAGE_CHARS),
            username: username.map(str::to_string),
            allowed_mentions: AllowedMentions { parse: vec![] },
        }
    }
}

pub fn summary(report: &SuccessReport, username: Option<&str>) -> WebhookMessage {
    let r = &report.result;
    let title = if r.page_title.trim().is_empty() {
        "(untitled)".to_string()
    } else {
        clip(r.page_title.trim(), MAX_TITLE_CHARS)
    };

    let mut lines = vec![
        format!("📄 **Page extracted:** <{}>", r.url),
        format!("**Title:** {}", title),
    ];
    if let Some(final_url) = &r.final_url {
        lines.push(format!("**Landed on:** <{}>", final_url));
    }
    let chars = r.visible_text.chars().count();
    if r.truncated {
        lines.push(format!(
            "**Characters:** {} (truncated from {})",
            chars, r.original_chars
        ));
    } else {
        lines.push(format!("**Characters:** {}", chars));
    }
    lines.push(format!(
        "**Chunks:** {} · **Resources:** {} · **Scrolls:** {} · **Elapsed:** {}ms",
        report.chunks.len(),
        r.resource_count,
        r.scroll_count,
        r.elapsed_millis
    ));
    if r.screenshot.is_some() {
        lines.push("**Screenshot:** attached".to_string());
    }
    if !r.warnings.is_empty() {
        lines.push(format!("⚠️ {}", r.warnings.join("; ")));
    }
    lines.push(format!("`job {}`", report.job_id));

    WebhookMessage::new(lines.join("\n"), username)
}

/// Largest chunk that still fits one message once [`chunk`] has added its
/// `i/n` header and code fence, for any total up to `max_total`.
pub fn max_chunk_chars(max_total: usize) -> usize {
    let digits = max_total.max(1).to_string().len();
    // "`" i "/" n "`" "\n```\n" ... "\n```"
    let frame = 2 * digits + 12;
    MAX_MESSAGE_CHARS.saturating_sub(frame)
}

pub fn chunk(chunk: &Chunk, username: Option<&str>) -> WebhookMessage {
    // A literal fence inside the text would close ours early.
    let body = chunk.content.replace("```", "'''");
    WebhookMessage::new(
        format!("`{}/{}`\n```\n{}\n```", chunk.index + 1, chunk.total, body),
        username,
    )
}

pub fn failure(report: &FailureReport, username: Option<&str>) -> WebhookMessage {
    let content = [
        format!("❌ **Extraction failed:** <{}>", report.url),
        format!(
            "**Error ({}):** {}",
            report.error_kind,
            clip(&report.error, MAX_ERROR_CHARS)
        ),
        format!("**Elapsed:** {}ms", report.elapsed_millis),
        format!("`job {}`", report.job_id),
    ]
    .join("\n");
    WebhookMessage::new(content, username)
}

/// Cut `s` to at most `max` characters, marking the cut with `…`.
pub fn clip(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
