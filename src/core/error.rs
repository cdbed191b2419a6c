use std::time::Duration;
use thiserror::Error;

/// Failures a relay job (or an incoming request) can hit.
///
/// `Validation` is the only variant the HTTP caller ever sees; everything
/// else happens after the acknowledgment and is only observable through the
/// notifier's failure report or the local log.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("text extraction failed: {0}")]
    Extraction(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("job exceeded its {}ms deadline", .0.as_millis())]
    Timeout(Duration),

    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("too many jobs in flight ({0}); try again later")]
    Overloaded(usize),
}

/// Failures talking to the webhook sink.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("sink rejected message {message} with HTTP {status}: {body}")]
    Rejected {
        message: usize,
        status: u16,
        body: String,
    },

    #[error("sink unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("could not encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl RelayError {
    pub fn navigation(url: &str, reason: impl std::fmt::Display) -> Self {
        Self::Navigation {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Short machine-friendly label, used in logs and failure reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Navigation { .. } => "navigation",
            Self::Extraction(_) => "extraction",
            Self::Browser(_) => "browser",
            Self::Timeout(_) => "timeout",
            Self::Delivery(_) => "delivery",
            Self::Config(_) => "config",
            Self::Overloaded(_) => "overloaded",
        }
    }
}
