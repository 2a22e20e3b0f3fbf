//! Orchestration platform interface

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::DeployError;
use crate::models::platform::{JobStatus, WorkloadHealth};

/// Operations the engine needs from the orchestration platform
#[async_trait]
pub trait OrchestrationPlatform: Send + Sync {
    /// Create the build workload for a deployment and return its job name
    async fn create_build_job(
        &self,
        deployment_id: Uuid,
        env: &HashMap<String, String>,
    ) -> Result<String, DeployError>;

    /// Terminate every in-flight build workload of a service
    async fn cancel_build_jobs(&self, service_id: Uuid) -> Result<(), DeployError>;

    /// Current condition of a build job
    async fn get_job_status(&self, job_name: &str) -> Result<JobStatus, DeployError>;

    /// Live health of the workload matched by `selector` in `namespace`
    async fn get_live_health(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<WorkloadHealth, DeployError>;

    /// Number of build workloads currently running
    async fn count_active_jobs(&self) -> Result<usize, DeployError>;
}
