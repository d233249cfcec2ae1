//! HTTP webhook alert sink

use async_trait::async_trait;
use queuewatch_core::{AlertNotification, AlertSink, SinkError, WebhookConfig};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("queuewatch/", env!("CARGO_PKG_VERSION"));

/// Posts each notification as JSON to a fixed URL.
///
/// Delivery is attempted once; a non-2xx response is reported as
/// [`SinkError::Status`] and not retried.
#[derive(Debug, Clone)]
pub struct WebhookAlertSink {
    client: Client,
    url: String,
    timeout: Duration,
}

impl WebhookAlertSink {
    pub fn new(config: &WebhookConfig) -> Result<Self, SinkError> {
        let timeout = config.timeout();
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: config.url.clone(),
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn deliver(&self, notification: &AlertNotification) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SinkError::Timeout(self.timeout)
                } else {
                    SinkError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Status(status.as_u16()));
        }
        debug!(url = %self.url, status = status.as_u16(), "Webhook accepted alert");
        Ok(())
    }
}
