use crate::core::config::RelayConfig;
use crate::jobs::Dispatcher;
use std::sync::Arc;
use std::time::Instant;

/// Shared by every request handler. Holds no per-job state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub dispatcher: Arc<Dispatcher>,
    pub started_at: Instant,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("webhook_host", &self.config.webhook_url.host_str())
            .field("jobs", &self.dispatcher.stats())
            .finish()
    }
}

impl AppState {
    pub fn new(config: Arc<RelayConfig>, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            dispatcher: Arc::new(dispatcher),
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
