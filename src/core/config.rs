use crate::core::error::RelayError;
use crate::notify::message::max_chunk_chars;
use crate::text::MIN_TEXT_LENGTH;
use std::path::PathBuf;
use std::time::Duration;

// ---------------------------------------------------------------------------
// RelayFileConfig: optional page-relay.json, every field overridable by env
// ---------------------------------------------------------------------------

pub const ENV_CONFIG_PATH: &str = "PAGE_RELAY_CONFIG";
pub const ENV_WEBHOOK_URL: &str = "WEBHOOK_URL";
pub const ENV_WEBHOOK_USERNAME: &str = "WEBHOOK_USERNAME";
pub const ENV_SCREENSHOT_ENABLED: &str = "SCREENSHOT_ENABLED";
pub const ENV_MAX_SCROLLS: &str = "MAX_SCROLLS";
pub const ENV_SCROLL_DELAY_MS: &str = "SCROLL_DELAY_MS";
pub const ENV_MAX_UNCHANGED_SCROLLS: &str = "MAX_UNCHANGED_SCROLLS";
pub const ENV_PAGE_LOAD_TIMEOUT_MS: &str = "PAGE_LOAD_TIMEOUT_MS";
pub const ENV_SETTLE_MS: &str = "SETTLE_MS";
pub const ENV_MAX_TEXT_LENGTH: &str = "MAX_TEXT_LENGTH";
pub const ENV_CHUNK_LIMIT: &str = "CHUNK_LIMIT";
pub const ENV_MESSAGE_DELAY_MS: &str = "MESSAGE_DELAY_MS";
pub const ENV_MAX_CONCURRENT_JOBS: &str = "MAX_CONCURRENT_JOBS";
pub const ENV_JOB_TIMEOUT_MS: &str = "JOB_TIMEOUT_MS";
pub const ENV_MAX_QUEUED_JOBS: &str = "MAX_QUEUED_JOBS";
pub const ENV_VIEWPORT_WIDTH: &str = "VIEWPORT_WIDTH";
pub const ENV_VIEWPORT_HEIGHT: &str = "VIEWPORT_HEIGHT";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";

/// Mirrors `page-relay.json`. Every field is optional; absent fields fall
/// back to the environment, then to the built-in default.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct RelayFileConfig {
    pub webhook_url: Option<String>,
    pub webhook_username: Option<String>,
    pub screenshot_enabled: Option<bool>,
    pub max_scrolls: Option<u32>,
    pub scroll_delay_ms: Option<u64>,
    pub max_unchanged_scrolls: Option<u32>,
    pub page_load_timeout_ms: Option<u64>,
    pub settle_ms: Option<u64>,
    pub max_text_length: Option<usize>,
    pub chunk_limit: Option<usize>,
    pub message_delay_ms: Option<u64>,
    pub max_concurrent_jobs: Option<usize>,
    pub max_queued_jobs: Option<usize>,
    pub job_timeout_ms: Option<u64>,
    pub viewport_width: Option<u32>,
    pub viewport_height: Option<u32>,
    pub chrome_executable: Option<String>,
}

/// Load `page-relay.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `PAGE_RELAY_CONFIG` env var path
/// 2. `./page-relay.json`
///
/// Missing file → `RelayFileConfig::default()`.
/// Parse error → log a warning, return `RelayFileConfig::default()`.
pub fn load_file_config() -> RelayFileConfig {
    let mut candidates = vec![PathBuf::from("page-relay.json")];
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        candidates.insert(0, PathBuf::from(env_path));
    }

    for path in &candidates {
        let Ok(contents) = std::fs::read_to_string(path) else {
            continue;
        };
        return match serde_json::from_str::<RelayFileConfig>(&contents) {
            Ok(cfg) => {
                tracing::info!("page-relay.json loaded from {}", path.display());
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    "page-relay.json parse error at {}: {}; using env/defaults",
                    path.display(),
                    e
                );
                RelayFileConfig::default()
            }
        };
    }

    RelayFileConfig::default()
}

// ---------------------------------------------------------------------------
// RelayConfig: resolved, immutable, shared by Arc
// ---------------------------------------------------------------------------

/// Fully resolved runtime configuration. Built once in `main` and handed to
/// every component that needs it.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub webhook_url: url::Url,
    pub webhook_username: Option<String>,
    pub screenshot_enabled: bool,
    pub max_scrolls: u32,
    pub scroll_delay: Duration,
    pub max_unchanged_scrolls: u32,
    pub page_load_timeout: Duration,
    pub settle: Duration,
    pub max_text_length: usize,
    pub chunk_limit: usize,
    pub message_delay: Duration,
    pub max_concurrent_jobs: usize,
    /// Accepted jobs allowed to wait for a browser slot; beyond that `/send` answers 503.
    pub max_queued_jobs: usize,
    pub job_timeout: Duration,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub chrome_executable: Option<String>,
}

impl RelayConfig {
    /// Resolve from `page-relay.json` + process environment.
    pub fn load() -> Result<Self, RelayError> {
        let file = load_file_config();
        Self::resolve(&file, |key| std::env::var(key).ok())
    }

    /// Resolve with an explicit env lookup: file value → env → default.
    pub fn resolve<F>(file: &RelayFileConfig, env: F) -> Result<Self, RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_str = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let raw_webhook = file
            .webhook_url
            .clone()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| env_str(ENV_WEBHOOK_URL))
            .ok_or_else(|| {
                RelayError::Config(format!(
                    "{} is not set; refusing to start without a delivery sink",
                    ENV_WEBHOOK_URL
                ))
            })?;
        let webhook_url = parse_http_url(raw_webhook.trim())
            .map_err(|e| RelayError::Config(format!("{}: {}", ENV_WEBHOOK_URL, e)))?;

        let screenshot_enabled = match file.screenshot_enabled {
            Some(b) => b,
            None => match env_str(ENV_SCREENSHOT_ENABLED) {
                Some(v) => parse_bool(&v).ok_or_else(|| {
                    RelayError::Config(format!("{}: not a boolean: {}", ENV_SCREENSHOT_ENABLED, v))
                })?,
                None => false,
            },
        };

        let mut max_text_length =
            pick(file.max_text_length, &env_str, ENV_MAX_TEXT_LENGTH, 50_000)?;
        if max_text_length < MIN_TEXT_LENGTH {
            tracing::warn!(
                "{}={} leaves no room for the truncation marker; using {}",
                ENV_MAX_TEXT_LENGTH,
                max_text_length,
                MIN_TEXT_LENGTH
            );
            max_text_length = MIN_TEXT_LENGTH;
        }

        // Every chunk holds at least one visible char, so the chunk count
        // never exceeds the text cap.
        let max_chunk = max_chunk_chars(max_text_length);
        let mut chunk_limit = pick(file.chunk_limit, &env_str, ENV_CHUNK_LIMIT, 1_900)?.max(1);
        if chunk_limit > max_chunk {
            tracing::warn!(
                "{}={} would not fit one webhook message; using {}",
                ENV_CHUNK_LIMIT,
                chunk_limit,
                max_chunk
            );
            chunk_limit = max_chunk;
        }

        let cfg = Self {
            webhook_url,
            webhook_username: file
                .webhook_username
                .clone()
                .or_else(|| env_str(ENV_WEBHOOK_USERNAME)),
            screenshot_enabled,
            max_scrolls: pick(file.max_scrolls, &env_str, ENV_MAX_SCROLLS, 30)?,
            scroll_delay: Duration::from_millis(pick(
                file.scroll_delay_ms,
                &env_str,
                ENV_SCROLL_DELAY_MS,
                800,
            )?),
            max_unchanged_scrolls: pick(
                file.max_unchanged_scrolls,
                &env_str,
                ENV_MAX_UNCHANGED_SCROLLS,
                3,
            )?
            .max(1),
            page_load_timeout: Duration::from_millis(pick(
                file.page_load_timeout_ms,
                &env_str,
                ENV_PAGE_LOAD_TIMEOUT_MS,
                90_000,
            )?),
            settle: Duration::from_millis(pick(file.settle_ms, &env_str, ENV_SETTLE_MS, 1_000)?),
            max_text_length,
            chunk_limit,
            message_delay: Duration::from_millis(pick(
                file.message_delay_ms,
                &env_str,
                ENV_MESSAGE_DELAY_MS,
                1_000,
            )?),
            max_concurrent_jobs: pick(
                file.max_concurrent_jobs,
                &env_str,
                ENV_MAX_CONCURRENT_JOBS,
                2,
            )?
            .max(1),
            max_queued_jobs: pick(file.max_queued_jobs, &env_str, ENV_MAX_QUEUED_JOBS, 32)?,
            job_timeout: Duration::from_millis(pick(
                file.job_timeout_ms,
                &env_str,
                ENV_JOB_TIMEOUT_MS,
                300_000,
            )?),
            viewport_width: pick(file.viewport_width, &env_str, ENV_VIEWPORT_WIDTH, 1366)?,
            viewport_height: pick(file.viewport_height, &env_str, ENV_VIEWPORT_HEIGHT, 900)?,
            chrome_executable: file
                .chrome_executable
                .clone()
                .or_else(|| env_str(ENV_CHROME_EXECUTABLE)),
        };

        Ok(cfg)
    }

    /// Config echo for `/health`. Only the webhook host is shown; the path
    /// usually embeds the sink's secret token.
    pub fn echo(&self) -> serde_json::Value {
        serde_json::json!({
            "webhook_host": self.webhook_url.host_str().unwrap_or("unknown"),
            "screenshot_enabled": self.screenshot_enabled,
            "max_scrolls": self.max_scrolls,
            "scroll_delay_ms": self.scroll_delay.as_millis() as u64,
            "max_unchanged_scrolls": self.max_unchanged_scrolls,
            "page_load_timeout_ms": self.page_load_timeout.as_millis() as u64,
            "settle_ms": self.settle.as_millis() as u64,
            "max_text_length": self.max_text_length,
            "chunk_limit": self.chunk_limit,
            "message_delay_ms": self.message_delay.as_millis() as u64,
            "max_concurrent_jobs": self.max_concurrent_jobs,
            "max_queued_jobs": self.max_queued_jobs,
            "job_timeout_ms": self.job_timeout.as_millis() as u64,
            "viewport": format!("{}x{}", self.viewport_width, self.viewport_height),
        })
    }
}

fn pick<T, F>(file_value: Option<T>, env_str: &F, key: &str, default: T) -> Result<T, RelayError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = file_value {
        return Ok(v);
    }
    match env_str(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| RelayError::Config(format!("{}: {} ({})", key, e, raw))),
        None => Ok(default),
    }
}

pub fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse an absolute `http`/`https` URL with a host.
pub fn parse_http_url(raw: &str) -> Result<url::Url, String> {
    let parsed = url::Url::parse(raw).map_err(|e| format!("not a valid URL ({})", e))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme '{}'", parsed.scheme()));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err("URL has no host".to_string());
    }
    Ok(parsed)
}
