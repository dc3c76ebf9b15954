use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use reqwest::Client;
use tracing::debug;

use super::{WebhookDelivery, WebhookOutcome, WebhookPayload};

/// Sends channel events to webhook endpoints via HTTP POST.
///
/// No automatic retry: a failed delivery is recorded as failed, and any
/// retry policy belongs to the receiving endpoint's own resilience.
pub struct WebhookSender {
    client: Client,
}

impl WebhookSender {
    /// The timeout applies independently to each outbound request, so one
    /// hung target only costs itself.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn send_one(&self, url: &str, payload: &WebhookPayload) -> WebhookOutcome {
        match self.client.post(url).json(payload).send().await {
            Ok(response) => {
                let status = response.status();
                debug!(url, status = status.as_u16(), "webhook responded");
                WebhookOutcome {
                    url: url.to_string(),
                    success: status.is_success(),
                    status: Some(status.as_u16()),
                    error: (!status.is_success())
                        .then(|| format!("unexpected status {status}")),
                }
            }
            // Connection failures and timeouts land here and count the same
            // as a non-2xx answer.
            Err(e) => WebhookOutcome {
                url: url.to_string(),
                success: false,
                status: e.status().map(|s| s.as_u16()),
                error: Some(e.to_string()),
            },
        }
    }
}

#[async_trait]
impl WebhookDelivery for WebhookSender {
    async fn send_to_all(&self, urls: &[String], payload: &WebhookPayload) -> Vec<WebhookOutcome> {
        // Fan-out is bounded by the number of configured URLs per channel,
        // which is small by construction.
        join_all(urls.iter().map(|url| self.send_one(url, payload))).await
    }
}
