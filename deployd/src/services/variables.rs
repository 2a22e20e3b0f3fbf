//! Variable resolution interface

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::DeployError;

/// Resolves cross-service variable references for a service
#[async_trait]
pub trait VariableResolver: Send + Sync {
    /// Every variable of the service with references substituted
    async fn resolve_all(&self, service_id: Uuid) -> Result<HashMap<String, String>, DeployError>;
}
