//! Orchestration platform gateway client

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DeployError;
use crate::http::client::HttpClient;
use crate::models::platform::{JobStatus, WorkloadHealth};
use crate::services::platform::OrchestrationPlatform;

#[derive(Debug, Serialize)]
struct CreateJobRequest<'a> {
    env: &'a HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct CreateJobResponse {
    job_name: String,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    health: String,
}

#[derive(Debug, Deserialize)]
struct ActiveJobsResponse {
    count: usize,
}

/// [`OrchestrationPlatform`] backed by the platform gateway's HTTP API
pub struct HttpPlatformClient {
    http: HttpClient,
}

impl HttpPlatformClient {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

fn platform_error(e: DeployError) -> DeployError {
    match e {
        DeployError::PlatformError(_) => e,
        other => DeployError::PlatformError(other.to_string()),
    }
}

#[async_trait]
impl OrchestrationPlatform for HttpPlatformClient {
    async fn create_build_job(
        &self,
        deployment_id: Uuid,
        env: &HashMap<String, String>,
    ) -> Result<String, DeployError> {
        let path = format!("/deployments/{}/build-jobs", deployment_id);
        let response: CreateJobResponse = self
            .http
            .post(&path, &CreateJobRequest { env })
            .await
            .map_err(platform_error)?;
        Ok(response.job_name)
    }

    async fn cancel_build_jobs(&self, service_id: Uuid) -> Result<(), DeployError> {
        let path = format!("/services/{}/build-jobs", service_id);
        self.http.delete(&path).await.map_err(platform_error)
    }

    async fn get_job_status(&self, job_name: &str) -> Result<JobStatus, DeployError> {
        let path = format!("/build-jobs/{}", job_name);
        self.http.get(&path, &[]).await.map_err(platform_error)
    }

    async fn get_live_health(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<WorkloadHealth, DeployError> {
        let path = format!("/namespaces/{}/health", namespace);
        let response: HealthResponse = self
            .http
            .get(&path, &[("selector", selector)])
            .await
            .map_err(platform_error)?;
        Ok(WorkloadHealth::parse(&response.health))
    }

    async fn count_active_jobs(&self) -> Result<usize, DeployError> {
        let response: ActiveJobsResponse = self
            .http
            .get("/build-jobs/active", &[])
            .await
            .map_err(platform_error)?;
        Ok(response.count)
    }
}
