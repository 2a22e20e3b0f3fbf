//! Variable service client

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::DeployError;
use crate::http::client::HttpClient;
use crate::services::variables::VariableResolver;

#[derive(Debug, Deserialize)]
struct ResolvedVariables {
    #[serde(default)]
    variables: HashMap<String, String>,
}

/// [`VariableResolver`] backed by the variable service
pub struct HttpVariableResolver {
    http: HttpClient,
}

impl HttpVariableResolver {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl VariableResolver for HttpVariableResolver {
    async fn resolve_all(&self, service_id: Uuid) -> Result<HashMap<String, String>, DeployError> {
        let path = format!("/services/{}/variables/resolved", service_id);
        let response: ResolvedVariables = self
            .http
            .get(&path, &[])
            .await
            .map_err(|e| DeployError::VariableResolution(e.to_string()))?;
        Ok(response.variables)
    }
}
