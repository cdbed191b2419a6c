//! Out-of-band delivery of job outcomes.
//!
//! The runner hands a [`JobReport`] to a [`Notifier`]; the only production
//! notifier is the chat webhook in [`webhook`].

pub mod message;
pub mod webhook;

use crate::core::error::DeliveryError;
use crate::core::types::{Chunk, ExtractionResult};
use async_trait::async_trait;

pub use webhook::WebhookNotifier;

#[derive(Debug, Clone)]
pub struct SuccessReport {
    pub job_id: String,
    pub result: ExtractionResult,
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Clone)]
pub struct FailureReport {
    pub job_id: String,
    pub url: String,
    pub elapsed_millis: u64,
    pub error_kind: &'static str,
    pub error: String,
}

#[derive(Debug, Clone)]
pub enum JobReport {
    Success(SuccessReport),
    Failure(FailureReport),
}

impl JobReport {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Success(s) => &s.job_id,
            Self::Failure(f) => &f.job_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliveryOutcome {
    pub messages_sent: usize,
    pub attachment_bytes: usize,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver every message for `report`, in order. Stops at the first
    /// rejected or failed message.
    async fn deliver(&self, report: &JobReport) -> Result<DeliveryOutcome, DeliveryError>;
}
