//! Platform-observed state

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Outcome of a build job as classified by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum JobCondition {
    Succeeded,
    Failed { reason: String },
    /// Anything not yet final, kept verbatim for observability
    Other { raw: String },
}

/// Job status returned by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    #[serde(flatten)]
    pub condition: JobCondition,

    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Live health classification of a running workload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadHealth {
    Active,
    Deploying,
    Crashing,
    Unknown(String),
}

impl WorkloadHealth {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "active" | "healthy" => WorkloadHealth::Active,
            "deploying" | "progressing" => WorkloadHealth::Deploying,
            "crashing" | "crashloopbackoff" => WorkloadHealth::Crashing,
            _ => WorkloadHealth::Unknown(raw.to_string()),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, WorkloadHealth::Active)
    }
}

/// Container registry identity handed to the build worker
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryCredentials {
    pub registry_url: String,
    pub username: String,
    pub password: SecretString,
}
