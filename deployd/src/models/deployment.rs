//! Deployment models

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::deploy::fsm::BuildStatus;

/// What triggered a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentSource {
    #[default]
    Manual,
    GitPush,
    Redeploy,
    Rollback,
    Api,
}

impl DeploymentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentSource::Manual => "manual",
            DeploymentSource::GitPush => "git_push",
            DeploymentSource::Redeploy => "redeploy",
            DeploymentSource::Rollback => "rollback",
            DeploymentSource::Api => "api",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(DeploymentSource::Manual),
            "git_push" => Some(DeploymentSource::GitPush),
            "redeploy" => Some(DeploymentSource::Redeploy),
            "rollback" => Some(DeploymentSource::Rollback),
            "api" => Some(DeploymentSource::Api),
            _ => None,
        }
    }
}

/// Queue payload describing one build/deploy request.
///
/// Serialized as JSON into the durable queue store, so field names are part of
/// the at-rest format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentJobRequest {
    pub service_id: Uuid,

    #[serde(default)]
    pub source: DeploymentSource,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committer: Option<String>,

    /// Environment handed to the build worker
    #[serde(default)]
    pub env_vars: HashMap<String, String>,

    /// Services that must be healthy before this one is built
    #[serde(default)]
    pub depends_on: Vec<Uuid>,

    #[serde(default)]
    pub no_cache: bool,

    /// Set when re-queuing or promoting an already-created deployment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_deployment_id: Option<Uuid>,
}

impl DeploymentJobRequest {
    pub fn new(service_id: Uuid, source: DeploymentSource) -> Self {
        Self {
            service_id,
            source,
            commit_sha: None,
            commit_message: None,
            committer: None,
            env_vars: HashMap::new(),
            depends_on: Vec::new(),
            no_cache: false,
            existing_deployment_id: None,
        }
    }
}

/// A persisted deployment record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: Uuid,
    pub service_id: Uuid,
    pub status: BuildStatus,
    pub source: DeploymentSource,
    pub commit_sha: Option<String>,
    pub commit_message: Option<String>,
    pub commit_author: Option<String>,
    /// Resolved container image reference
    pub image: Option<String>,
    /// Name of the platform job building this deployment
    pub job_name: Option<String>,
    pub error: Option<String>,
    /// Last raw condition string reported by the platform
    pub raw_status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub queued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Fields needed to create a deployment record
#[derive(Debug, Clone)]
pub struct NewDeployment {
    pub service_id: Uuid,
    pub status: BuildStatus,
    pub source: DeploymentSource,
    pub commit_sha: Option<String>,
    pub commit_message: Option<String>,
    pub commit_author: Option<String>,
}

impl NewDeployment {
    /// Build from a job request, starting in `status`
    pub fn from_request(request: &DeploymentJobRequest, status: BuildStatus) -> Self {
        Self {
            service_id: request.service_id,
            status,
            source: request.source,
            commit_sha: request.commit_sha.clone(),
            commit_message: request.commit_message.clone(),
            commit_author: request.committer.clone(),
        }
    }
}
