//! Scripted stand-ins for the browser, shared by the scraping and job tests.

use super::driver::{BrowserLauncher, LaunchOptions, PageDriver, READY_STATE_JS, RESOURCE_COUNT_JS};
use super::scroll::SCROLL_HEIGHT_JS;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Heights {
    Fixed(Vec<u64>),
    Growing { start: u64, step: u64 },
}

#[derive(Debug, Default)]
struct Log {
    height_reads: usize,
    scroll_targets: Vec<u64>,
    gotos: Vec<String>,
}

/// A page whose every answer is scripted up front.
#[derive(Debug, Clone)]
pub struct FakePage {
    heights: Heights,
    responses: HashMap<String, Value>,
    failing_scripts: HashSet<String>,
    fail_scroll_after: Option<usize>,
    goto_delay: Option<Duration>,
    goto_error: Option<String>,
    screenshot: Option<Vec<u8>>,
    panic_on_title: bool,
    log: Arc<Mutex<Log>>,
    closes: Arc<AtomicUsize>,
}

impl FakePage {
    pub fn new() -> Self {
        let mut responses = HashMap::new();
        responses.insert(READY_STATE_JS.to_string(), json!("complete"));
        responses.insert(RESOURCE_COUNT_JS.to_string(), json!(12));
        responses.insert("document.title".to_string(), json!("Fake Page"));
        Self {
            heights: Heights::Fixed(vec![1000]),
            responses,
            failing_scripts: HashSet::new(),
            fail_scroll_after: None,
            goto_delay: None,
            goto_error: None,
            screenshot: Some(vec![0x89, b'P', b'N', b'G']),
            panic_on_title: false,
            log: Arc::new(Mutex::new(Log::default())),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Successive height readings; the last one repeats forever.
    pub fn with_heights(mut self, heights: Vec<u64>) -> Self {
        self.heights = Heights::Fixed(heights);
        self
    }

    /// Height grows by `step` on every reading (infinite scroll).
    pub fn with_growing_height(mut self, start: u64, step: u64) -> Self {
        self.heights = Heights::Growing { start, step };
        self
    }

    pub fn with_script(mut self, script: &str, value: Value) -> Self {
        self.responses.insert(script.to_string(), value);
        self
    }

    pub fn failing_script(mut self, script: &str) -> Self {
        self.failing_scripts.insert(script.to_string());
        self
    }

    /// Scrolls away from the top fail once `n` of them have succeeded.
    pub fn failing_scroll_after(mut self, n: usize) -> Self {
        self.fail_scroll_after = Some(n);
        self
    }

    pub fn with_goto_delay(mut self, delay: Duration) -> Self {
        self.goto_delay = Some(delay);
        self
    }

    pub fn with_goto_error(mut self, msg: &str) -> Self {
        self.goto_error = Some(msg.to_string());
        self
    }

    pub fn without_screenshot(mut self) -> Self {
        self.screenshot = None;
        self
    }

    pub fn panicking_on_title(mut self) -> Self {
        self.panic_on_title = true;
        self
    }

    pub fn scrolls_to_bottom(&self) -> usize {
        self.log
            .lock()
            .unwrap()
            .scroll_targets
            .iter()
            .filter(|&&y| y > 0)
            .count()
    }

    pub fn last_scroll_target(&self) -> Option<u64> {
        self.log.lock().unwrap().scroll_targets.last().copied()
    }

    pub fn gotos(&self) -> Vec<String> {
        self.log.lock().unwrap().gotos.clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn next_height(&self) -> u64 {
        let mut log = self.log.lock().unwrap();
        let n = log.height_reads;
        log.height_reads += 1;
        match &self.heights {
            Heights::Fixed(v) => v.get(n).or(v.last()).copied().unwrap_or(0),
            Heights::Growing { start, step } => start + step * n as u64,
        }
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn goto(&self, url: &str) -> Result<()> {
        self.log.lock().unwrap().gotos.push(url.to_string());
        if let Some(d) = self.goto_delay {
            tokio::time::sleep(d).await;
        }
        match &self.goto_error {
            Some(msg) => Err(anyhow!("{}", msg)),
            None => Ok(()),
        }
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        if self.failing_scripts.contains(script) {
            return Err(anyhow!("script failed: {}", script));
        }
        if script == SCROLL_HEIGHT_JS {
            return Ok(json!(self.next_height()));
        }
        if let Some(y) = script
            .strip_prefix("window.scrollTo(0, ")
            .and_then(|rest| rest.strip_suffix(");"))
            .and_then(|n| n.parse::<u64>().ok())
        {
            let mut log = self.log.lock().unwrap();
            let done = log.scroll_targets.iter().filter(|&&t| t > 0).count();
            if y > 0 && self.fail_scroll_after.is_some_and(|n| done >= n) {
                return Err(anyhow!("scroll rejected"));
            }
            log.scroll_targets.push(y);
            return Ok(Value::Null);
        }
        if script == "document.title" && self.panic_on_title {
            panic!("renderer crashed");
        }
        Ok(self.responses.get(script).cloned().unwrap_or(Value::Null))
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>> {
        self.screenshot
            .clone()
            .ok_or_else(|| anyhow!("screenshot capture failed"))
    }

    async fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out clones of one scripted page; clones share logs and counters.
#[derive(Debug, Clone)]
pub struct FakeLauncher {
    page: FakePage,
    fail_launch: bool,
    launches: Arc<AtomicUsize>,
}

impl FakeLauncher {
    pub fn new(page: FakePage) -> Self {
        Self {
            page,
            fail_launch: false,
            launches: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_launch: true,
            ..Self::new(FakePage::new())
        }
    }

    pub fn page(&self) -> &FakePage {
        &self.page
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, _opts: &LaunchOptions) -> Result<Box<dyn PageDriver>> {
        if self.fail_launch {
            return Err(anyhow!("No browser found"));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.page.clone()))
    }
}
