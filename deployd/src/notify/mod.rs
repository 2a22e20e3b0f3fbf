//! Deployment notifications
//!
//! Producers hold a [`Notifier`] and never wait on delivery. Events travel over
//! a bounded channel to the dispatcher worker, which owns retries.

pub mod dispatcher;
pub mod webhook;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::errors::DeployError;

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A notification about a deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Machine-readable event name, e.g. `deployment.queued`
    pub name: String,
    pub level: NotificationLevel,
    pub title: String,
    pub url: String,
    pub fields: Vec<(String, String)>,
}

impl NotificationEvent {
    pub fn new(
        name: impl Into<String>,
        level: NotificationLevel,
        title: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            level,
            title: title.into(),
            url: url.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }
}

/// Builds links to deployments in the dashboard
#[derive(Debug, Clone)]
pub struct DeploymentLinks {
    dashboard_url: String,
}

impl DeploymentLinks {
    pub fn new(dashboard_url: &str) -> Self {
        Self {
            dashboard_url: dashboard_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn deployment(&self, service_id: Uuid, deployment_id: Uuid) -> String {
        format!(
            "{}/services/{}/deployments/{}",
            self.dashboard_url, service_id, deployment_id
        )
    }
}

/// Delivers notification events somewhere
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, event: &NotificationEvent) -> Result<(), DeployError>;
}

/// Non-blocking handle for emitting notifications
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: Option<mpsc::Sender<NotificationEvent>>,
}

impl Notifier {
    /// Create a notifier and the receiver the dispatcher drains
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<NotificationEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// A notifier that drops every event
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Queue an event for delivery; drops it when the channel is full or closed
    pub fn notify(&self, event: NotificationEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.try_send(event) {
            match e {
                mpsc::error::TrySendError::Full(event) => {
                    warn!("Notification channel full, dropping '{}'", event.name);
                }
                mpsc::error::TrySendError::Closed(event) => {
                    warn!("Notification channel closed, dropping '{}'", event.name);
                }
            }
        }
    }
}
