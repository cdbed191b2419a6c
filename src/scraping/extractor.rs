//! One URL in, one [`ExtractionResult`] out.
//!
//! Pipeline: launch isolated browser → navigate (bounded) → network idle →
//! document ready + settle → auto-scroll → text fallback chain → normalize →
//! optional screenshot. The browser is closed on every exit path, including
//! timeouts and panics inside the pipeline.

use super::driver::{
    eval_string, eval_u64, wait_for_document_ready, wait_for_network_idle, BrowserLauncher,
    LaunchOptions, PageDriver, RESOURCE_COUNT_JS,
};
use super::scroll::{scroll, ScrollPolicy, ScrollStop};
use crate::core::config::RelayConfig;
use crate::core::error::RelayError;
use crate::core::types::ExtractionResult;
use crate::text::{normalize, NO_CONTENT};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Quiet window for the network-idle heuristic.
const IDLE_QUIET: Duration = Duration::from_millis(500);
/// How long to wait for `document.readyState` once navigation returned.
const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// A text source tried in order until one yields non-blank text.
#[derive(Debug, Clone, Copy)]
pub struct TextStrategy {
    pub name: &'static str,
    pub script: &'static str,
}

pub const TEXT_STRATEGIES: &[TextStrategy] = &[
    TextStrategy {
        name: "inner_text",
        script: "document.body ? document.body.innerText : ''",
    },
    TextStrategy {
        name: "text_content",
        script: "document.body ? document.body.textContent : ''",
    },
    TextStrategy {
        name: "content_elements",
        script: "Array.from(document.querySelectorAll('h1,h2,h3,h4,h5,h6,p,li,blockquote,pre,td,th,figcaption'))\
            .map(e => (e.innerText || e.textContent || '').trim())\
            .filter(t => t.length > 0)\
            .join('\\n')",
    },
    TextStrategy {
        name: "document_text",
        script: "document.documentElement ? (document.documentElement.innerText || document.documentElement.textContent || '') : ''",
    },
];

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub launch: LaunchOptions,
    pub page_load_timeout: Duration,
    pub settle: Duration,
    pub scroll: ScrollPolicy,
    pub max_text_length: usize,
    pub screenshot_enabled: bool,
    /// Hard cap on the whole pipeline, browser launch excluded.
    pub deadline: Duration,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            launch: LaunchOptions::default(),
            page_load_timeout: Duration::from_secs(90),
            settle: Duration::from_secs(1),
            scroll: ScrollPolicy::default(),
            max_text_length: 50_000,
            screenshot_enabled: false,
            deadline: Duration::from_secs(300),
        }
    }
}

impl From<&RelayConfig> for ExtractOptions {
    fn from(cfg: &RelayConfig) -> Self {
        Self {
            launch: LaunchOptions {
                viewport_width: cfg.viewport_width,
                viewport_height: cfg.viewport_height,
                chrome_executable: cfg.chrome_executable.clone(),
                ..LaunchOptions::default()
            },
            page_load_timeout: cfg.page_load_timeout,
            settle: cfg.settle,
            scroll: ScrollPolicy {
                max_scrolls: cfg.max_scrolls,
                delay: cfg.scroll_delay,
                max_unchanged: cfg.max_unchanged_scrolls,
                settle: Duration::from_millis(500),
            },
            max_text_length: cfg.max_text_length,
            screenshot_enabled: cfg.screenshot_enabled,
            deadline: cfg.job_timeout,
        }
    }
}

pub struct PageExtractor {
    launcher: Arc<dyn BrowserLauncher>,
    opts: ExtractOptions,
}

impl PageExtractor {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, opts: ExtractOptions) -> Self {
        Self { launcher, opts }
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.opts
    }

    /// Extract `url` in a fresh browser.
    ///
    /// Errors: `Browser` if no browser could be started, `Navigation` if the
    /// page never loaded within `page_load_timeout`, `Timeout` if the whole
    /// pipeline ran past `deadline`. An empty page is *not* an error; it
    /// yields the `[no content]` sentinel and a warning.
    pub async fn extract(&self, url: &str) -> Result<ExtractionResult, RelayError> {
        let started = Instant::now();
        let mut page = self
            .launcher
            .launch(&self.opts.launch)
            .await
            .map_err(|e| RelayError::Browser(e.to_string()))?;

        let pipeline = tokio::time::timeout(self.opts.deadline, self.run_pipeline(page.as_ref(), url, started));
        let outcome = AssertUnwindSafe(pipeline).catch_unwind().await;

        if let Err(e) = page.close().await {
            warn!("browser close error (non-fatal): {}", e);
        }

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RelayError::Timeout(self.opts.deadline)),
            Err(_) => Err(RelayError::Extraction(format!("pipeline panicked while extracting {}", url))),
        }
    }

    async fn run_pipeline(
        &self,
        page: &dyn PageDriver,
        url: &str,
        started: Instant,
    ) -> Result<ExtractionResult, RelayError> {
        let mut warnings = Vec::new();

        // Navigation: the load event must arrive within the budget.
        let nav_start = Instant::now();
        match tokio::time::timeout(self.opts.page_load_timeout, page.goto(url)).await {
            Err(_) => {
                return Err(RelayError::navigation(
                    url,
                    format!("timed out after {}ms", self.opts.page_load_timeout.as_millis()),
                ))
            }
            Ok(Err(e)) => return Err(RelayError::navigation(url, e)),
            Ok(Ok(())) => {}
        }

        let idle_budget = self.opts.page_load_timeout.saturating_sub(nav_start.elapsed());
        if !wait_for_network_idle(page, IDLE_QUIET, idle_budget).await {
            warnings.push("network did not go idle before the page-load timeout".to_string());
        }

        if !wait_for_document_ready(page, self.opts.settle, READY_TIMEOUT).await {
            return Err(RelayError::navigation(url, "document never reached a ready state"));
        }

        let scrolled = scroll(page, &self.opts.scroll).await;
        if scrolled.stop == ScrollStop::Error {
            warnings.push(format!("auto-scroll stopped early after {} scrolls", scrolled.scrolls));
        }

        let (raw_text, text_source) = match first_visible_text(page).await {
            Some((name, text)) => (text, Some(name.to_string())),
            None => {
                let err = RelayError::Extraction(format!(
                    "all {} text strategies came back empty",
                    TEXT_STRATEGIES.len()
                ));
                warn!("{} ({})", err, url);
                warnings.push(err.to_string());
                (NO_CONTENT.to_string(), None)
            }
        };
        let normalized = normalize(&raw_text, self.opts.max_text_length);

        let page_title = eval_string(page, "document.title")
            .await
            .ok()
            .flatten()
            .unwrap_or_default();
        let final_url = eval_string(page, "location.href")
            .await
            .ok()
            .flatten()
            .filter(|u| u != url);
        let resource_count = eval_u64(page, RESOURCE_COUNT_JS)
            .await
            .ok()
            .flatten()
            .unwrap_or(0);

        let screenshot = if self.opts.screenshot_enabled {
            match page.screenshot_png().await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!("screenshot failed for {}: {}", url, e);
                    warnings.push(format!("screenshot failed: {}", e));
                    None
                }
            }
        } else {
            None
        };

        let elapsed_millis = started.elapsed().as_millis() as u64;
        info!(
            "✅ extracted {} chars from {} via {} ({} scrolls, {}ms)",
            normalized.text.chars().count(),
            url,
            text_source.as_deref().unwrap_or("none"),
            scrolled.scrolls,
            elapsed_millis
        );

        Ok(ExtractionResult {
            url: url.to_string(),
            final_url,
            page_title,
            visible_text: normalized.text,
            text_source,
            truncated: normalized.truncated,
            original_chars: normalized.original_chars,
            screenshot,
            resource_count,
            scroll_count: scrolled.scrolls,
            elapsed_millis,
            warnings,
        })
    }
}

/// Walk [`TEXT_STRATEGIES`] and return the first non-blank result.
pub async fn first_visible_text(page: &dyn PageDriver) -> Option<(&'static str, String)> {
    for strategy in TEXT_STRATEGIES {
        match eval_string(page, strategy.script).await {
            Ok(Some(text)) if !text.trim().is_empty() => return Some((strategy.name, text)),
            Ok(_) => debug!("text strategy {} yielded nothing", strategy.name),
            Err(e) => debug!("text strategy {} failed: {}", strategy.name, e),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraping::testing::{FakeLauncher, FakePage};
    use crate::text::TRUNCATION_MARKER;
    use serde_json::json;

    fn opts() -> ExtractOptions {
        ExtractOptions {
            page_load_timeout: Duration::from_secs(5),
            settle: Duration::from_millis(10),
            scroll: ScrollPolicy {
                max_scrolls: 5,
                delay: Duration::from_millis(10),
                max_unchanged: 3,
                settle: Duration::from_millis(10),
            },
            max_text_length: 1_000,
            screenshot_enabled: false,
            deadline: Duration::from_secs(60),
            ..ExtractOptions::default()
        }
    }

    fn extractor(launcher: &FakeLauncher, opts: ExtractOptions) -> PageExtractor {
        PageExtractor::new(Arc::new(launcher.clone()), opts)
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_path_uses_inner_text_and_closes() {
        let page = FakePage::new()
            .with_script(TEXT_STRATEGIES[0].script, json!("Hello\n\n\n\nworld"))
            .with_script("document.title", json!("Greeting"));
        let launcher = FakeLauncher::new(page);

        let result = extractor(&launcher, opts())
            .extract("https://example.com/")
            .await
            .unwrap();

        assert_eq!(result.visible_text, "Hello\n\nworld");
        assert_eq!(result.text_source.as_deref(), Some("inner_text"));
        assert_eq!(result.page_title, "Greeting");
        assert_eq!(result.resource_count, 12);
        assert!(result.screenshot.is_none());
        assert_eq!(launcher.page().gotos(), vec!["https://example.com/".to_string()]);
        assert_eq!(launcher.page().close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_through_strategies() {
        let page = FakePage::new()
            .with_script(TEXT_STRATEGIES[0].script, json!("   "))
            .failing_script(TEXT_STRATEGIES[1].script)
            .with_script(TEXT_STRATEGIES[2].script, json!("Heading\nParagraph"));
        let launcher = FakeLauncher::new(page);

        let result = extractor(&launcher, opts()).extract("https://example.com/").await.unwrap();
        assert_eq!(result.text_source.as_deref(), Some("content_elements"));
        assert_eq!(result.visible_text, "Heading\nParagraph");
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_page_degrades_to_sentinel() {
        let launcher = FakeLauncher::new(FakePage::new());
        let result = extractor(&launcher, opts()).extract("https://example.com/").await.unwrap();
        assert_eq!(result.visible_text, NO_CONTENT);
        assert!(result.text_source.is_none());
        assert!(result.warnings.iter().any(|w| w.contains("text strategies")));
        assert_eq!(launcher.page().close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_text_is_truncated_with_marker() {
        let page = FakePage::new().with_script(TEXT_STRATEGIES[0].script, json!("a ".repeat(2_000)));
        let launcher = FakeLauncher::new(page);
        let result = extractor(&launcher, opts()).extract("https://example.com/").await.unwrap();
        assert!(result.truncated);
        assert!(result.visible_text.chars().count() <= 1_000);
        assert!(result.visible_text.ends_with(TRUNCATION_MARKER));
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_timeout_is_navigation_error_and_closes() {
        let page = FakePage::new().with_goto_delay(Duration::from_secs(30));
        let launcher = FakeLauncher::new(page);

        let err = extractor(&launcher, opts())
            .extract("https://slow.example.com/")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Navigation { .. }), "{err:?}");
        assert!(err.to_string().contains("timed out"));
        assert_eq!(launcher.page().close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_failure_closes() {
        let page = FakePage::new().with_goto_error("net::ERR_NAME_NOT_RESOLVED");
        let launcher = FakeLauncher::new(page);
        let err = extractor(&launcher, opts()).extract("https://nx.example/").await.unwrap_err();
        assert!(err.to_string().contains("ERR_NAME_NOT_RESOLVED"));
        assert_eq!(launcher.page().close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_document_never_ready_is_navigation_error() {
        let page = FakePage::new().with_script(crate::scraping::driver::READY_STATE_JS, json!("loading"));
        let launcher = FakeLauncher::new(page);
        let err = extractor(&launcher, opts()).extract("https://example.com/").await.unwrap_err();
        assert!(matches!(err, RelayError::Navigation { .. }));
        assert_eq!(launcher.page().close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_screenshot_failure_is_a_warning() {
        let page = FakePage::new()
            .with_script(TEXT_STRATEGIES[0].script, json!("body"))
            .without_screenshot();
        let launcher = FakeLauncher::new(page);
        let mut o = opts();
        o.screenshot_enabled = true;

        let result = extractor(&launcher, o).extract("https://example.com/").await.unwrap();
        assert!(result.screenshot.is_none());
        assert!(result.warnings.iter().any(|w| w.starts_with("screenshot failed")));
        assert_eq!(launcher.page().close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_screenshot_captured_when_enabled() {
        let page = FakePage::new().with_script(TEXT_STRATEGIES[0].script, json!("body"));
        let launcher = FakeLauncher::new(page);
        let mut o = opts();
        o.screenshot_enabled = true;
        let result = extractor(&launcher, o).extract("https://example.com/").await.unwrap();
        assert_eq!(result.screenshot.as_deref(), Some(&[0x89, b'P', b'N', b'G'][..]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_infinite_scroll_still_succeeds() {
        let page = FakePage::new()
            .with_growing_height(1_000, 800)
            .with_script(TEXT_STRATEGIES[0].script, json!("feed item"));
        let launcher = FakeLauncher::new(page);
        let result = extractor(&launcher, opts()).extract("https://feed.example.com/").await.unwrap();
        assert_eq!(result.scroll_count, 5);
        assert_eq!(launcher.page().scrolls_to_bottom(), 5);
        assert_eq!(result.visible_text, "feed item");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_is_timeout_and_closes() {
        let page = FakePage::new().with_goto_delay(Duration::from_secs(4));
        let launcher = FakeLauncher::new(page);
        let mut o = opts();
        o.deadline = Duration::from_secs(2);
        let err = extractor(&launcher, o).extract("https://example.com/").await.unwrap_err();
        assert!(matches!(err, RelayError::Timeout(_)));
        assert_eq!(launcher.page().close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_inside_pipeline_still_closes() {
        let page = FakePage::new()
            .with_script(TEXT_STRATEGIES[0].script, json!("body"))
            .panicking_on_title();
        let launcher = FakeLauncher::new(page);
        let err = extractor(&launcher, opts()).extract("https://example.com/").await.unwrap_err();
        assert!(matches!(err, RelayError::Extraction(_)));
        assert_eq!(launcher.page().close_count(), 1);
    }

    #[tokio::test]
    async fn test_launch_failure_is_browser_error() {
        let launcher = FakeLauncher::failing();
        let err = extractor(&launcher, opts()).extract("https://example.com/").await.unwrap_err();
        assert!(matches!(err, RelayError::Browser(_)));
    }
}
