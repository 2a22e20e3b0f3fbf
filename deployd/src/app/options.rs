//! Application configuration options

use std::time::Duration;

use secrecy::SecretString;

use crate::controller::ControllerOptions;
use crate::notify::dispatcher;
use crate::queue::processor;
use crate::storage::settings::Settings;
use crate::workers::status_sync;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Redis URL for both job queues
    pub redis_url: String,

    /// Deployment record store
    pub database: DatabaseOptions,

    /// Collaborator service endpoints
    pub upstream: UpstreamOptions,

    /// Deployment queue name
    pub deployment_queue: String,

    /// Dependent queue name
    pub dependent_queue: String,

    /// Controller and background worker options
    pub controller: ControllerOptions,

    /// Notification delivery options
    pub notifications: NotificationOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for AppOptions {
    fn from(settings: &Settings) -> Self {
        let queues = &settings.queues;
        let deployment_processor = processor::Options {
            poll_interval: Duration::from_secs(queues.poll_interval_secs),
            max_active_workloads: queues.max_active_workloads,
            ..Default::default()
        };
        let dependent_processor = processor::Options {
            poll_interval: Duration::from_secs(queues.dependent_poll_interval_secs),
            ..Default::default()
        };

        Self {
            lifecycle: LifecycleOptions {
                max_shutdown_delay: Duration::from_secs(settings.max_shutdown_delay_secs),
            },
            redis_url: settings.redis_url.clone(),
            database: DatabaseOptions {
                url: settings.database.url.clone(),
                max_connections: settings.database.max_connections,
            },
            upstream: UpstreamOptions {
                platform_url: settings.upstream.platform_url.clone(),
                variables_url: settings.upstream.variables_url.clone(),
                registry_url: settings.upstream.registry_url.clone(),
                api_token: settings.upstream.api_token.clone(),
                request_timeout: Duration::from_secs(settings.upstream.request_timeout_secs),
            },
            deployment_queue: queues.deployment_queue.clone(),
            dependent_queue: queues.dependent_queue.clone(),
            controller: ControllerOptions {
                namespace: settings.platform.namespace.clone(),
                service_label: settings.platform.service_label.clone(),
                dashboard_url: settings.dashboard_url.clone(),
                deployment_processor,
                dependent_processor,
                status_sync: status_sync::Options {
                    interval: Duration::from_secs(settings.sync_interval_secs),
                    ..Default::default()
                },
            },
            notifications: NotificationOptions {
                webhook_url: settings.notifications.webhook_url.clone(),
                channel_capacity: settings.notifications.channel_capacity,
                timeout: Duration::from_secs(settings.notifications.timeout_secs),
                dispatcher: dispatcher::Options {
                    max_attempts: settings.notifications.max_attempts,
                    ..Default::default()
                },
            },
        }
    }
}

/// Lifecycle options for the daemon
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Postgres connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub url: String,
    pub max_connections: u32,
}

/// Collaborator service endpoints
#[derive(Debug, Clone)]
pub struct UpstreamOptions {
    pub platform_url: String,
    pub variables_url: String,
    pub registry_url: String,
    pub api_token: Option<SecretString>,
    pub request_timeout: Duration,
}

/// Notification delivery options
#[derive(Debug, Clone)]
pub struct NotificationOptions {
    /// Notifications are disabled when unset
    pub webhook_url: Option<String>,
    pub channel_capacity: usize,
    pub timeout: Duration,
    pub dispatcher: dispatcher::Options,
}
