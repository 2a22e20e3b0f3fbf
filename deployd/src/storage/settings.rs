//! Settings file management

use std::path::Path;

use secrecy::SecretString;
use serde::Deserialize;
use tokio::fs;

use crate::errors::DeployError;
use crate::logs::LogLevel;

/// Settings file read when `--config` is not given
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/deployd/settings.json";

/// Daemon settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Logging configuration
    #[serde(default)]
    pub log: LogSettings,

    /// Redis holding both job queues
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Postgres holding deployment records
    #[serde(default)]
    pub database: DatabaseSettings,

    /// Collaborator service endpoints
    #[serde(default)]
    pub upstream: UpstreamSettings,

    /// Orchestration platform configuration
    #[serde(default)]
    pub platform: PlatformSettings,

    /// Queue configuration
    #[serde(default)]
    pub queues: QueueSettings,

    /// Notification delivery
    #[serde(default)]
    pub notifications: NotificationSettings,

    /// Base URL of the dashboard, used for links in notifications
    #[serde(default = "default_dashboard_url")]
    pub dashboard_url: String,

    /// Seconds between status synchronization sweeps
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,

    /// Seconds allowed for graceful shutdown
    #[serde(default = "default_max_shutdown_delay")]
    pub max_shutdown_delay_secs: u64,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_dashboard_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_sync_interval() -> u64 {
    30
}

fn default_max_shutdown_delay() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log: LogSettings::default(),
            redis_url: default_redis_url(),
            database: DatabaseSettings::default(),
            upstream: UpstreamSettings::default(),
            platform: PlatformSettings::default(),
            queues: QueueSettings::default(),
            notifications: NotificationSettings::default(),
            dashboard_url: default_dashboard_url(),
            sync_interval_secs: default_sync_interval(),
            max_shutdown_delay_secs: default_max_shutdown_delay(),
        }
    }
}

impl Settings {
    /// Read and validate the settings file at `path`
    pub async fn load(path: &Path) -> Result<Self, DeployError> {
        let contents = fs::read_to_string(path).await.map_err(|e| {
            DeployError::ConfigError(format!("unable to read {}: {}", path.display(), e))
        })?;
        let settings: Settings = serde_json::from_str(&contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the daemon cannot run with
    pub fn validate(&self) -> Result<(), DeployError> {
        if self.queues.max_active_workloads == 0 {
            return Err(DeployError::ConfigError(
                "queues.max_active_workloads must be at least 1".to_string(),
            ));
        }
        if self.notifications.channel_capacity == 0 {
            return Err(DeployError::ConfigError(
                "notifications.channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.queues.deployment_queue == self.queues.dependent_queue {
            return Err(DeployError::ConfigError(
                "deployment and dependent queues must have different names".to_string(),
            ));
        }
        if self.sync_interval_secs == 0 || self.queues.poll_interval_secs == 0 {
            return Err(DeployError::ConfigError(
                "intervals must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogSettings {
    #[serde(default)]
    pub level: LogLevel,

    /// Emit JSON lines on stdout
    #[serde(default)]
    pub json: bool,

    /// Directory for daily rolling log files
    #[serde(default)]
    pub dir: Option<String>,
}

/// Database settings
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_database_url")]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    "postgres://localhost/deployd".to_string()
}

fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

/// Endpoints of the platform gateway, variable service and registry service
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamSettings {
    #[serde(default = "default_platform_url")]
    pub platform_url: String,

    #[serde(default = "default_variables_url")]
    pub variables_url: String,

    #[serde(default = "default_registry_url")]
    pub registry_url: String,

    /// Bearer token sent to every upstream
    #[serde(default)]
    pub api_token: Option<SecretString>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_platform_url() -> String {
    "http://localhost:8081".to_string()
}

fn default_variables_url() -> String {
    "http://localhost:8082".to_string()
}

fn default_registry_url() -> String {
    "http://localhost:8083".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            platform_url: default_platform_url(),
            variables_url: default_variables_url(),
            registry_url: default_registry_url(),
            api_token: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Orchestration platform settings
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformSettings {
    /// Namespace queried for dependency health
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Label carrying the service ID on workloads
    #[serde(default = "default_service_label")]
    pub service_label: String,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_service_label() -> String {
    "deployd.io/service-id".to_string()
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            service_label: default_service_label(),
        }
    }
}

/// Queue settings
#[derive(Debug, Clone, Deserialize)]
pub struct QueueSettings {
    #[serde(default = "default_deployment_queue")]
    pub deployment_queue: String,

    #[serde(default = "default_dependent_queue")]
    pub dependent_queue: String,

    /// Seconds between deployment queue ticks
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Seconds between dependent queue ticks
    #[serde(default = "default_dependent_poll_interval")]
    pub dependent_poll_interval_secs: u64,

    /// Stop admitting builds while this many are active on the platform
    #[serde(default = "default_max_active_workloads")]
    pub max_active_workloads: usize,
}

fn default_deployment_queue() -> String {
    "deployd:deployments".to_string()
}

fn default_dependent_queue() -> String {
    "deployd:dependents".to_string()
}

fn default_poll_interval() -> u64 {
    2
}

fn default_dependent_poll_interval() -> u64 {
    10
}

fn default_max_active_workloads() -> usize {
    4
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            deployment_queue: default_deployment_queue(),
            dependent_queue: default_dependent_queue(),
            poll_interval_secs: default_poll_interval(),
            dependent_poll_interval_secs: default_dependent_poll_interval(),
            max_active_workloads: default_max_active_workloads(),
        }
    }
}

/// Notification settings
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationSettings {
    /// Webhook receiving every event; notifications are off when unset
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Events buffered before new ones are dropped
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Delivery attempts per event
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
}

fn default_channel_capacity() -> usize {
    256
}

fn default_max_attempts() -> u32 {
    3
}

fn default_webhook_timeout() -> u64 {
    10
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            channel_capacity: default_channel_capacity(),
            max_attempts: default_max_attempts(),
            timeout_secs: default_webhook_timeout(),
        }
    }
}
