//! Container registry credential interface

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::DeployError;
use crate::models::platform::RegistryCredentials;

/// Source of registry identity and image-pull secrets
#[async_trait]
pub trait RegistryProvider: Send + Sync {
    /// Credentials the build worker pushes images with
    async fn credentials(&self) -> Result<RegistryCredentials, DeployError>;

    /// Names of image-pull secrets attached to the service
    async fn image_pull_secrets(&self, service_id: Uuid) -> Result<Vec<String>, DeployError>;
}
