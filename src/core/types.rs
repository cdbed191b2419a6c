use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

// ── Front door ───────────────────────────────────────────────────────────────

/// Query string accepted by `GET /send`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SendParams {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    /// Always `"accepted"`; the job outcome is reported out of band.
    pub status: String,
    pub job_id: String,
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ── Jobs ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    fn can_become(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
        )
    }
}

/// One extraction request, alive only for the duration of its run.
///
/// `result` is present iff the job succeeded and `error` iff it failed;
/// the transition methods are the only way to reach either state.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub target_url: url::Url,
    pub state: JobState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<ExtractionResult>,
    pub error: Option<String>,
    // Monotonic clock for elapsed-time reporting; wall-clock stamps above are for display.
    run_started: Option<Instant>,
    run_elapsed: Option<Duration>,
}

impl Job {
    pub fn new(target_url: url::Url) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            target_url,
            state: JobState::Pending,
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
            run_started: None,
            run_elapsed: None,
        }
    }

    /// `Pending -> Running`. Returns `false` (and changes nothing) from any other state.
    pub fn start(&mut self) -> bool {
        if !self.state.can_become(JobState::Running) {
            return false;
        }
        self.state = JobState::Running;
        self.started_at = Some(Utc::now());
        self.run_started = Some(Instant::now());
        true
    }

    /// `Running -> Succeeded`.
    pub fn succeed(&mut self, result: ExtractionResult) -> bool {
        if !self.state.can_become(JobState::Succeeded) {
            return false;
        }
        self.state = JobState::Succeeded;
        self.mark_finished();
        self.result = Some(result);
        true
    }

    /// `Running -> Failed`.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if !self.state.can_become(JobState::Failed) {
            return false;
        }
        self.state = JobState::Failed;
        self.mark_finished();
        self.error = Some(error.into());
        true
    }

    fn mark_finished(&mut self) {
        self.finished_at = Some(Utc::now());
        self.run_elapsed = self.run_started.map(|t| t.elapsed());
    }

    /// Milliseconds the job has been (or was) running; 0 if it never started.
    pub fn elapsed_millis(&self) -> u64 {
        let elapsed = match (self.run_elapsed, self.run_started) {
            (Some(d), _) => d,
            (None, Some(t)) => t.elapsed(),
            (None, None) => Duration::ZERO,
        };
        elapsed.as_millis() as u64
    }
}

// ── Extraction ───────────────────────────────────────────────────────────────

/// Everything the page extractor learned about one URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub url: String,
    /// URL after redirects, when the page reports one.
    #[serde(default)]
    pub final_url: Option<String>,
    pub page_title: String,
    /// Normalized, length-capped text. Truncation is marked inside the text.
    pub visible_text: String,
    /// Which fallback produced the text; `None` when every strategy came back empty.
    #[serde(default)]
    pub text_source: Option<String>,
    #[serde(default)]
    pub truncated: bool,
    /// Character count before truncation.
    #[serde(default)]
    pub original_chars: usize,
    /// PNG bytes; only captured when screenshots are enabled.
    #[serde(skip)]
    pub screenshot: Option<Vec<u8>>,
    pub resource_count: u64,
    pub scroll_count: u32,
    pub elapsed_millis: u64,
    /// Non-fatal step failures (idle wait, screenshot, ...).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// A size-bounded slice of extracted text, numbered for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Zero-based position.
    pub index: usize,
    pub total: usize,
    pub content: String,
}

impl Chunk {
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}
