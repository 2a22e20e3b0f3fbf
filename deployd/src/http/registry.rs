//! Registry service client

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::DeployError;
use crate::http::client::HttpClient;
use crate::models::platform::RegistryCredentials;
use crate::services::registry::RegistryProvider;

#[derive(Debug, Deserialize)]
struct PullSecretsResponse {
    #[serde(default)]
    secrets: Vec<String>,
}

/// [`RegistryProvider`] backed by the registry service
pub struct HttpRegistryProvider {
    http: HttpClient,
}

impl HttpRegistryProvider {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

fn registry_error(e: DeployError) -> DeployError {
    DeployError::RegistryError(e.to_string())
}

#[async_trait]
impl RegistryProvider for HttpRegistryProvider {
    async fn credentials(&self) -> Result<RegistryCredentials, DeployError> {
        self.http
            .get("/registry/credentials", &[])
            .await
            .map_err(registry_error)
    }

    async fn image_pull_secrets(&self, service_id: Uuid) -> Result<Vec<String>, DeployError> {
        let path = format!("/services/{}/image-pull-secrets", service_id);
        let response: PullSecretsResponse =
            self.http.get(&path, &[]).await.map_err(registry_error)?;
        Ok(response.secrets)
    }
}
