//! Seams between the extraction pipeline and the browser.
//!
//! The pipeline only ever talks to a [`PageDriver`]: evaluate a script,
//! navigate, screenshot, close. The production implementation is
//! `browser_manager::ChromePage` (chromiumoxide over CDP); tests plug in
//! scripted fakes.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Per-launch browser settings, derived from `RelayConfig`.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub chrome_executable: Option<String>,
    pub user_agent: Option<String>,
    pub accept_language: String,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            viewport_width: 1366,
            viewport_height: 900,
            chrome_executable: None,
            user_agent: None,
            accept_language: "en-US,en;q=0.9".to_string(),
        }
    }
}

/// A single tab in a browser that belongs exclusively to one job.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate and wait for the load event.
    async fn goto(&self, url: &str) -> Result<()>;

    /// Evaluate `script` in the page; `undefined` comes back as `Value::Null`.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// Full-page PNG.
    async fn screenshot_png(&self) -> Result<Vec<u8>>;

    /// Tear down the tab *and* the browser process behind it.
    async fn close(&mut self) -> Result<()>;
}

/// Starts an isolated browser context (fresh profile, no shared cookies).
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, opts: &LaunchOptions) -> Result<Box<dyn PageDriver>>;
}

// ── Typed evaluate helpers ───────────────────────────────────────────────────

pub(crate) async fn eval_string(page: &dyn PageDriver, script: &str) -> Result<Option<String>> {
    let v = page.evaluate(script).await?;
    Ok(v.as_str().map(str::to_string))
}

pub(crate) async fn eval_u64(page: &dyn PageDriver, script: &str) -> Result<Option<u64>> {
    let v = page.evaluate(script).await?;
    Ok(v.as_u64().or_else(|| v.as_f64().map(|f| f.max(0.0) as u64)))
}

// ── Smart wait / networkidle ─────────────────────────────────────────────────

pub const RESOURCE_COUNT_JS: &str = "performance.getEntriesByType('resource').length";
pub const READY_STATE_JS: &str = "document.readyState";

/// Wait until no new resource entries appear for `quiet` or `timeout` elapses.
///
/// Polls `performance.getEntriesByType("resource").length` every 250 ms and
/// only lets the quiet window start once `document.readyState` is
/// `complete`. Returns `true` when idle was reached, `false` on timeout.
pub async fn wait_for_network_idle(page: &dyn PageDriver, quiet: Duration, timeout: Duration) -> bool {
    let poll = Duration::from_millis(250);
    let start = tokio::time::Instant::now();
    let mut last_count: u64 = 0;
    let mut stable_since = tokio::time::Instant::now();

    loop {
        if start.elapsed() >= timeout {
            tracing::debug!("network idle: timeout after {}ms", timeout.as_millis());
            return false;
        }

        let count = eval_u64(page, RESOURCE_COUNT_JS).await.ok().flatten().unwrap_or(0);
        let ready_complete = eval_string(page, READY_STATE_JS)
            .await
            .ok()
            .flatten()
            .is_some_and(|s| s == "complete");

        if !ready_complete || count != last_count {
            last_count = count;
            stable_since = tokio::time::Instant::now();
        } else if stable_since.elapsed() >= quiet {
            tracing::debug!(
                "network idle after {}ms ({} resources)",
                start.elapsed().as_millis(),
                count
            );
            return true;
        }

        tokio::time::sleep(poll).await;
    }
}

/// Poll until `document.readyState` is `interactive` or `complete`, then
/// sleep `settle`. Gives up (returning `false`) after `timeout`.
pub async fn wait_for_document_ready(page: &dyn PageDriver, settle: Duration, timeout: Duration) -> bool {
    let start = tokio::time::Instant::now();
    loop {
        let state = eval_string(page, READY_STATE_JS).await.ok().flatten();
        if matches!(state.as_deref(), Some("interactive") | Some("complete")) {
            tokio::time::sleep(settle).await;
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
