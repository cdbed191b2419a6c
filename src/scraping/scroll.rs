//! Adaptive auto-scroll: keep jumping to the bottom until the document stops
//! growing, the scroll budget runs out, or the page reports no height.

use super::driver::{eval_u64, PageDriver};
use std::time::Duration;
use tracing::{debug, warn};

pub const SCROLL_HEIGHT_JS: &str = "Math.max(\
    document.body ? document.body.scrollHeight : 0, \
    document.documentElement ? document.documentElement.scrollHeight : 0)";

pub fn scroll_to_js(y: u64) -> String {
    format!("window.scrollTo(0, {y});")
}

#[derive(Debug, Clone)]
pub struct ScrollPolicy {
    pub max_scrolls: u32,
    pub delay: Duration,
    /// Consecutive identical height readings that count as "fully loaded".
    pub max_unchanged: u32,
    /// Pause after returning to the top.
    pub settle: Duration,
}

impl Default for ScrollPolicy {
    fn default() -> Self {
        Self {
            max_scrolls: 30,
            delay: Duration::from_millis(800),
            max_unchanged: 3,
            settle: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollStop {
    /// Height stayed the same for `max_unchanged` readings.
    Stable,
    /// `max_scrolls` reached while the page was still growing.
    Budget,
    /// Height read as zero; nothing rendered yet.
    NotRendered,
    /// A measurement or scroll call failed; we keep whatever loaded.
    Error,
}

/// Per-run bookkeeping; lives only inside [`scroll`].
#[derive(Debug, Default)]
struct ScrollState {
    scroll_count: u32,
    previous_height: Option<u64>,
    unchanged_streak: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollOutcome {
    pub scrolls: u32,
    pub last_height: u64,
    pub stop: ScrollStop,
}

/// Drive `page` through a bounded scroll sequence.
///
/// Never fails: errors end the loop early and are reported through
/// [`ScrollStop::Error`]. Always tries to scroll back to the top afterwards
/// so later extraction and screenshots see the viewport at the origin.
pub async fn scroll(page: &dyn PageDriver, policy: &ScrollPolicy) -> ScrollOutcome {
    let mut state = ScrollState::default();
    let mut last_height = 0;
    let max_unchanged = policy.max_unchanged.max(1);

    let stop = loop {
        if state.scroll_count >= policy.max_scrolls {
            break ScrollStop::Budget;
        }

        let height = match eval_u64(page, SCROLL_HEIGHT_JS).await {
            Ok(h) => h.unwrap_or(0),
            Err(e) => {
                warn!("auto-scroll: height probe failed: {}", e);
                break ScrollStop::Error;
            }
        };
        if height == 0 {
            break ScrollStop::NotRendered;
        }
        last_height = height;

        if state.previous_height == Some(height) {
            state.unchanged_streak += 1;
            if state.unchanged_streak >= max_unchanged {
                break ScrollStop::Stable;
            }
        } else {
            state.unchanged_streak = 0;
            state.previous_height = Some(height);
        }

        if let Err(e) = page.evaluate(&scroll_to_js(height)).await {
            warn!("auto-scroll: scroll {} failed: {}", state.scroll_count + 1, e);
            break ScrollStop::Error;
        }
        tokio::time::sleep(policy.delay).await;
        state.scroll_count += 1;
    };

    debug!(
        "auto-scroll finished: {:?} after {} scrolls (height {})",
        stop, state.scroll_count, last_height
    );

    if let Err(e) = page.evaluate(&scroll_to_js(0)).await {
        warn!("auto-scroll: return to top failed: {}", e);
    }
    tokio::time::sleep(policy.settle).await;

    ScrollOutcome {
        scrolls: state.scroll_count,
        last_height,
        stop,
    }
}
