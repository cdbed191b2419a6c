use super::message::{self, WebhookMessage};
use super::{DeliveryOutcome, JobReport, Notifier};
use crate::core::config::RelayConfig;
use crate::core::error::DeliveryError;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use tracing::{debug, info};

const MAX_ERROR_BODY_CHARS: usize = 300;

/// Posts job reports to a Discord-compatible webhook.
///
/// Summary first (screenshot attached to it when present), then one message
/// per chunk with `message_delay` between sends. No retries: the first
/// non-2xx answer ends delivery.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: url::Url,
    username: Option<String>,
    message_delay: Duration,
}

impl WebhookNotifier {
    pub fn new(client: reqwest::Client, url: url::Url) -> Self {
        Self {
            client,
            url,
            username: None,
            message_delay: Duration::from_secs(1),
        }
    }

    pub fn from_config(client: reqwest::Client, cfg: &RelayConfig) -> Self {
        Self::new(client, cfg.webhook_url.clone())
            .with_username(cfg.webhook_username.clone())
            .with_message_delay(cfg.message_delay)
    }

    pub fn with_username(mut self, username: Option<String>) -> Self {
        self.username = username;
        self
    }

    pub fn with_message_delay(mut self, delay: Duration) -> Self {
        self.message_delay = delay;
        self
    }

    async fn post_json(&self, index: usize, msg: &WebhookMessage) -> Result<(), DeliveryError> {
        let resp = self.client.post(self.url.clone()).json(msg).send().await?;
        check_status(index, resp).await
    }

    async fn post_with_attachment(
        &self,
        index: usize,
        msg: &WebhookMessage,
        png: &[u8],
    ) -> Result<(), DeliveryError> {
        let form = Form::new()
            .text("payload_json", serde_json::to_string(msg)?)
            .part(
                "files[0]",
                Part::bytes(png.to_vec())
                    .file_name("screenshot.png")
                    .mime_str("image/png")?,
            );
        let resp = self
            .client
            .post(self.url.clone())
            .multipart(form)
            .send()
            .await?;
        check_status(index, resp).await
    }
}

async fn check_status(index: usize, resp: reqwest::Response) -> Result<(), DeliveryError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let body = resp.text().await.unwrap_or_default();
    Err(DeliveryError::Rejected {
        message: index,
        status: status.as_u16(),
        body: message::clip(body.trim(), MAX_ERROR_BODY_CHARS),
    })
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, report: &JobReport) -> Result<DeliveryOutcome, DeliveryError> {
        let username = self.username.as_deref();
        match report {
            JobReport::Success(success) => {
                let summary = message::summary(success, username);
                let attachment_bytes = match success.result.screenshot.as_deref() {
                    Some(png) => {
                        self.post_with_attachment(0, &summary, png).await?;
                        png.len()
                    }
                    None => {
                        self.post_json(0, &summary).await?;
                        0
                    }
                };

                let mut sent = 1;
                for chunk in &success.chunks {
                    tokio::time::sleep(self.message_delay).await;
                    self.post_json(sent, &message::chunk(chunk, username)).await?;
                    debug!(
                        "job {}: chunk {}/{} delivered",
                        success.job_id,
                        chunk.index + 1,
                        chunk.total
                    );
                    sent += 1;
                }

                info!("📨 job {}: delivered {} messages", success.job_id, sent);
                Ok(DeliveryOutcome {
                    messages_sent: sent,
                    attachment_bytes,
                })
            }
            JobReport::Failure(failure) => {
                self.post_json(0, &message::failure(failure, username)).await?;
                info!("📨 job {}: failure report delivered", failure.job_id);
                Ok(DeliveryOutcome {
                    messages_sent: 1,
                    attachment_bytes: 0,
                })
            }
        }
    }
}
