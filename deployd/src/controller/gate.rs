//! Dependency gate for dependent deployments

use std::sync::Arc;

use tracing::{debug, warn};

use crate::models::deployment::DeploymentJobRequest;
use crate::services::platform::OrchestrationPlatform;
use crate::services::variables::VariableResolver;

/// Decides whether a service's prerequisites are satisfied
pub struct DependencyGate {
    variables: Arc<dyn VariableResolver>,
    platform: Arc<dyn OrchestrationPlatform>,
    namespace: String,
    service_label: String,
}

impl DependencyGate {
    pub fn new(
        variables: Arc<dyn VariableResolver>,
        platform: Arc<dyn OrchestrationPlatform>,
        namespace: String,
        service_label: String,
    ) -> Self {
        Self {
            variables,
            platform,
            namespace,
            service_label,
        }
    }

    /// Label selector matching the workload of `service_id`
    pub fn selector_for(&self, service_id: &uuid::Uuid) -> String {
        format!("{}={}", self.service_label, service_id)
    }

    /// Ready when the service's variables resolve and every declared
    /// dependency reports an active workload. Any error counts as not ready.
    pub async fn are_dependencies_ready(&self, request: &DeploymentJobRequest) -> bool {
        if let Err(e) = self.variables.resolve_all(request.service_id).await {
            debug!(
                "Service {} not ready, variables unresolved: {}",
                request.service_id, e
            );
            return false;
        }

        for dependency in &request.depends_on {
            let selector = self.selector_for(dependency);
            match self.platform.get_live_health(&self.namespace, &selector).await {
                Ok(health) if health.is_active() => {}
                Ok(health) => {
                    debug!(
                        "Service {} waiting on {} ({:?})",
                        request.service_id, dependency, health
                    );
                    return false;
                }
                Err(e) => {
                    warn!(
                        "Health check of dependency {} for {} failed: {}",
                        dependency, request.service_id, e
                    );
                    return false;
                }
            }
        }

        true
    }
}
