//! Deployment record persistence

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::deploy::fsm::BuildStatus;
use crate::errors::DeployError;
use crate::models::deployment::{Deployment, NewDeployment};

/// Store of deployment records.
///
/// Status writes follow the transitions allowed by [`BuildStatus`]; a write
/// that would leave a terminal state fails with `InvalidTransition`.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    async fn create(&self, new: NewDeployment) -> Result<Deployment, DeployError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Deployment, DeployError>;

    async fn get_by_status(&self, status: BuildStatus) -> Result<Vec<Deployment>, DeployError>;

    /// Non-terminal deployments of a service
    async fn get_active_by_service(&self, service_id: Uuid)
        -> Result<Vec<Deployment>, DeployError>;

    async fn mark_queued(&self, id: Uuid) -> Result<Deployment, DeployError>;

    async fn mark_started(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DeployError>;

    async fn mark_failed(&self, id: Uuid, error: &str, at: DateTime<Utc>)
        -> Result<(), DeployError>;

    async fn mark_succeeded(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DeployError>;

    /// Cancel every listed deployment that is not already terminal.
    /// Returns how many rows changed.
    async fn mark_cancelled(&self, ids: &[Uuid]) -> Result<u64, DeployError>;

    async fn assign_job_name(&self, id: Uuid, job_name: &str) -> Result<(), DeployError>;

    async fn set_raw_status(&self, id: Uuid, raw: &str) -> Result<(), DeployError>;
}
