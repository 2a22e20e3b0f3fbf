//! Webhook notification sink

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::errors::DeployError;
use crate::notify::{NotificationEvent, NotificationLevel, NotificationSink};

#[derive(Serialize)]
struct WebhookField<'a> {
    name: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    event: &'a str,
    level: NotificationLevel,
    title: &'a str,
    url: &'a str,
    fields: Vec<WebhookField<'a>>,
}

impl<'a> From<&'a NotificationEvent> for WebhookPayload<'a> {
    fn from(event: &'a NotificationEvent) -> Self {
        Self {
            event: &event.name,
            level: event.level,
            title: &event.title,
            url: &event.url,
            fields: event
                .fields
                .iter()
                .map(|(name, value)| WebhookField { name, value })
                .collect(),
        }
    }
}

/// Posts events as JSON to a fixed URL
pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, DeployError> {
        url::Url::parse(url)
            .map_err(|e| DeployError::ConfigError(format!("Invalid webhook URL {}: {}", url, e)))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn deliver(&self, event: &NotificationEvent) -> Result<(), DeployError> {
        debug!("POST {} ({})", self.url, event.name);

        let response = self
            .client
            .post(&self.url)
            .json(&WebhookPayload::from(event))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DeployError::NotificationError(format!("{}: {}", status, body)));
        }
        Ok(())
    }
}
