//! Native browser management using `chromiumoxide`.
//!
//! This module is the production side of the [`PageDriver`] seam:
//! * Finding a usable browser executable (Brave → Chrome → Chromium, cross-platform).
//! * Building a headless launch config with a realistic UA and viewport.
//! * [`ChromeLauncher`]: one fresh browser process + throwaway profile per job.
//! * [`ChromePage`]: the single tab a job drives; closing it kills the process.
//!
//! Nothing here is shared between jobs: no pool, no cookie jar, no reused profile.

use super::driver::{BrowserLauncher, LaunchOptions, PageDriver};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::network::{Headers, SetExtraHttpHeadersParams};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use rand::seq::IndexedRandom;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ── Realistic User-Agent pool ────────────────────────────────────────────────

const DESKTOP_USER_AGENTS: &[&str] = &[
    // Chrome 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 132 – macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 131 – Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Edge 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36 Edg/132.0.0.0",
];

/// Returns a randomly-chosen realistic desktop User-Agent string.
///
/// Only Chromium UAs are in the pool: the engine really is Chromium, so a
/// Firefox or Safari UA would just produce mismatched feature detection.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    DESKTOP_USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(DESKTOP_USER_AGENTS[0])
}

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `explicit` (from config / `CHROME_EXECUTABLE`) when it exists
/// 2. PATH scan – finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable(explicit: Option<&str>) -> Option<String> {
    if let Some(p) = explicit.map(str::trim).filter(|p| !p.is_empty()) {
        if Path::new(p).exists() {
            return Some(p.to_string());
        }
        warn!("configured browser executable not found: {}", p);
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "chromium",
            "chromium-browser",
            "google-chrome",
            "google-chrome-stable",
            "brave-browser",
            "chrome",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/local/bin/chromium",
            "/snap/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

// ── Headless browser config builder ──────────────────────────────────────────

/// Build a `BrowserConfig` for one isolated headless session.
///
/// `profile_dir` must be unique per launch; it is the browser's whole
/// persistent state (cookies, storage, cache).
pub fn build_headless_config(
    exe: &str,
    profile_dir: &Path,
    user_agent: &str,
    width: u32,
    height: u32,
) -> Result<BrowserConfig> {
    BrowserConfig::builder()
        .chrome_executable(exe)
        .user_data_dir(profile_dir)
        .viewport(Viewport {
            width,
            height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(width, height)
        .arg("--disable-gpu")
        .arg("--no-sandbox") // often required in containers
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage") // avoids /dev/shm OOM in constrained environments
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--disable-crash-reporter")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--hide-scrollbars")
        .arg("--mute-audio")
        .arg(format!("--user-agent={}", user_agent))
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

// ── Launcher ─────────────────────────────────────────────────────────────────

/// Launches a brand-new Chromium process for every job.
#[derive(Debug, Default, Clone)]
pub struct ChromeLauncher;

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self, opts: &LaunchOptions) -> Result<Box<dyn PageDriver>> {
        let exe = find_chrome_executable(opts.chrome_executable.as_deref()).ok_or_else(|| {
            anyhow!("No browser found. Install Chrome or Chromium, or set CHROME_EXECUTABLE.")
        })?;

        let profile_dir =
            std::env::temp_dir().join(format!("page-relay-{}", uuid::Uuid::new_v4().simple()));
        let user_agent = opts
            .user_agent
            .clone()
            .unwrap_or_else(|| random_user_agent().to_string());
        let config = build_headless_config(
            &exe,
            &profile_dir,
            &user_agent,
            opts.viewport_width,
            opts.viewport_height,
        )?;

        info!("🚀 launching headless browser ({})", exe);
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| anyhow!("Failed to launch browser ({}): {}", exe, e))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler error: {}", e);
                }
            }
        });

        let page = match open_tab(&browser, &opts.accept_language).await {
            Ok(p) => p,
            Err(e) => {
                // The process is already up; never return without reaping it.
                shut_down(&mut browser, CLOSE_GRACE).await.ok();
                handler_task.abort();
                remove_profile(&profile_dir).await;
                return Err(e);
            }
        };

        Ok(Box::new(ChromePage {
            browser: Mutex::new(Some(browser)),
            page,
            handler_task: Some(handler_task),
            profile_dir,
        }))
    }
}

async fn open_tab(browser: &Browser, accept_language: &str) -> Result<Page> {
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| anyhow!("Failed to open tab: {}", e))?;
    page.execute(SetExtraHttpHeadersParams::new(Headers::new(
        serde_json::json!({ "Accept-Language": accept_language }),
    )))
    .await
    .map_err(|e| anyhow!("Failed to set request headers: {}", e))?;
    Ok(page)
}

// ── Process teardown ─────────────────────────────────────────────────────────

/// Upper bound for each teardown step before escalating to a kill.
const CLOSE_GRACE: Duration = Duration::from_secs(10);

/// The three teardown steps of a launched browser process.
#[async_trait]
trait BrowserProcess: Send {
    /// Ask the browser to exit over CDP.
    async fn request_close(&mut self) -> Result<()>;
    /// SIGKILL the child process.
    async fn force_kill(&mut self) -> Result<()>;
    /// Wait for the child to exit.
    async fn reap(&mut self) -> Result<()>;
}

#[async_trait]
impl BrowserProcess for Browser {
    async fn request_close(&mut self) -> Result<()> {
        self.close()
            .await
            .map(|_| ())
            .map_err(|e| anyhow!("Browser close error: {}", e))
    }

    async fn force_kill(&mut self) -> Result<()> {
        match self.kill().await {
            Some(res) => res.map_err(|e| anyhow!("Browser kill error: {}", e)),
            None => Ok(()),
        }
    }

    async fn reap(&mut self) -> Result<()> {
        self.wait()
            .await
            .map(|_| ())
            .map_err(|e| anyhow!("Browser wait error: {}", e))
    }
}

/// Close politely within `grace`, kill when that fails or stalls, then reap.
///
/// Returns the outcome of the polite close; the process is gone either way.
async fn shut_down<P: BrowserProcess + ?Sized>(proc: &mut P, grace: Duration) -> Result<()> {
    let closed = match tokio::time::timeout(grace, proc.request_close()).await {
        Ok(res) => res,
        Err(_) => Err(anyhow!(
            "browser did not close within {}ms",
            grace.as_millis()
        )),
    };
    if let Err(e) = &closed {
        warn!("{}; killing browser process", e);
        if let Err(e) = proc.force_kill().await {
            warn!("{}", e);
        }
    }

    match tokio::time::timeout(grace, proc.reap()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("{}", e),
        Err(_) => {
            warn!(
                "browser still running {}ms after close; killing",
                grace.as_millis()
            );
            if let Err(e) = proc.force_kill().await {
                warn!("{}", e);
            }
        }
    }

    closed
}

async fn remove_profile(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        debug!("profile cleanup {}: {}", dir.display(), e);
    }
}

// ── Page ─────────────────────────────────────────────────────────────────────

pub struct ChromePage {
    // Behind a mutex so the page is `Sync` regardless of the CDP client internals.
    browser: Mutex<Option<Browser>>,
    page: Page,
    // Drives the CDP connection; must outlive the close handshake.
    handler_task: Option<JoinHandle<()>>,
    profile_dir: PathBuf,
}

#[async_trait]
impl PageDriver for ChromePage {
    async fn goto(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| anyhow!("Failed to navigate: {}", e))?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| anyhow!("evaluate failed: {}", e))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>> {
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(true)
                    .build(),
            )
            .await
            .map_err(|e| anyhow!("screenshot capture failed: {}", e))
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut browser) = self.browser.get_mut().take() else {
            return Ok(());
        };
        let closed = shut_down(&mut browser, CLOSE_GRACE).await;
        if let Some(handler) = self.handler_task.take() {
            handler.abort();
        }
        remove_profile(&self.profile_dir).await;
        closed
    }
}

impl Drop for ChromePage {
    fn drop(&mut self) {
        // Safety net for a close() that never ran. Drop cannot await; spawn
        // the shutdown if we are still inside a tokio runtime.
        let Some(mut browser) = self.browser.get_mut().take() else {
            return;
        };
        warn!("ChromePage dropped without close(); shutting browser down in background");
        let handler = self.handler_task.take();
        let profile_dir = self.profile_dir.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    // The handler keeps running until the close handshake is over.
                    shut_down(&mut browser, CLOSE_GRACE).await.ok();
                    if let Some(handler) = handler {
                        handler.abort();
                    }
                    remove_profile(&profile_dir).await;
                });
            }
            Err(_) => {
                if let Some(handler) = handler {
                    handler.abort();
                }
            }
        }
    }
}
