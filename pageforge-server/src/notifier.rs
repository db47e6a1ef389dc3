//! Completion callback delivery.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;

use crate::error::{BuildError, BuildResult};
use crate::model::NotificationPayload;
use crate::retry::{self, RetryOutcome, RetryPolicy};

/// One delivery attempt to a callback URL.
#[async_trait]
pub trait NotifyTransport: Send + Sync {
    async fn post(&self, url: &str, payload: &NotificationPayload) -> anyhow::Result<()>;
}

/// Plain JSON POST; any 2xx counts as delivered.
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotifyTransport for HttpTransport {
    async fn post(&self, url: &str, payload: &NotificationPayload) -> anyhow::Result<()> {
        let resp = self
            .http
            .post(url)
            .json(payload)
            .send()
            .await
            .context("Failed to reach evaluation URL")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Evaluation URL answered {status}: {body}");
        }
        Ok(())
    }
}

pub struct Notifier {
    transport: Arc<dyn NotifyTransport>,
    policy: RetryPolicy,
}

impl Notifier {
    pub fn new(transport: Arc<dyn NotifyTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Deliver `payload` to `url`, retrying with backoff.
    ///
    /// Returns the number of attempts used. Exhaustion is logged here and
    /// also returned so the caller can count it.
    pub async fn notify(&self, url: &str, payload: &NotificationPayload) -> BuildResult<u32> {
        let outcome = retry::retry(&self.policy, |attempt| {
            tracing::debug!(task = %payload.task, url, attempt = attempt + 1, "Posting notification");
            self.transport.post(url, payload)
        })
        .await;

        match outcome {
            RetryOutcome::Succeeded { attempts, .. } => {
                tracing::info!(
                    task = %payload.task,
                    round = payload.round,
                    attempts,
                    "Notification delivered"
                );
                Ok(attempts)
            }
            RetryOutcome::Exhausted {
                last_error,
                attempts,
            } => {
                let last_error = format!("{last_error:#}");
                tracing::error!(
                    task = %payload.task,
                    round = payload.round,
                    attempts,
                    error = %last_error,
                    "Notification failed, giving up"
                );
                Err(BuildError::NotificationDelivery {
                    attempts,
                    last_error,
                })
            }
        }
    }
}
