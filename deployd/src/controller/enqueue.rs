//! Admission of new work and supersession of old work

use std::collections::HashMap;

use chrono::Utc;
use secrecy::ExposeSecret;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::controller::{deployment_id_of, DeploymentController};
use crate::deploy::fsm::BuildStatus;
use crate::errors::DeployError;
use crate::models::deployment::{Deployment, DeploymentJobRequest, NewDeployment};
use crate::notify::{NotificationEvent, NotificationLevel};

/// Build environment keys set by the engine
pub mod env {
    pub const DEPLOYMENT_ID: &str = "DEPLOYMENT_ID";
    pub const NO_CACHE: &str = "NO_CACHE";
    pub const REGISTRY_URL: &str = "REGISTRY_URL";
    pub const REGISTRY_USERNAME: &str = "REGISTRY_USERNAME";
    pub const REGISTRY_PASSWORD: &str = "REGISTRY_PASSWORD";
    pub const IMAGE_PULL_SECRETS: &str = "IMAGE_PULL_SECRETS";

    pub const RESERVED: [&str; 6] = [
        DEPLOYMENT_ID,
        NO_CACHE,
        REGISTRY_URL,
        REGISTRY_USERNAME,
        REGISTRY_PASSWORD,
        IMAGE_PULL_SECRETS,
    ];
}

impl DeploymentController {
    /// Supersede the service's outstanding work and queue `request` for build.
    ///
    /// Returns the deployment in `Queued`. Validation failures are recorded on
    /// the deployment as `Failed` before the error is returned.
    pub async fn enqueue_deployment_job(
        &self,
        request: DeploymentJobRequest,
    ) -> Result<Deployment, DeployError> {
        let _guard = self.service_locks.lock(request.service_id).await;
        let mut request = request;

        self.cancel_existing_jobs(request.service_id).await?;

        let deployment = match request.existing_deployment_id {
            Some(id) => self.store.mark_queued(id).await?,
            None => {
                self.store
                    .create(NewDeployment::from_request(&request, BuildStatus::Queued))
                    .await?
            }
        };

        if let Err(e) = self.populate_environment(&deployment, &mut request).await {
            self.fail_deployment(&deployment, &e).await;
            return Err(e);
        }

        let key = deployment.id.to_string();
        if let Err(e) = self.deployment_queue.enqueue(&key, request).await {
            self.fail_deployment(&deployment, &e).await;
            return Err(e);
        }

        info!(
            "Queued deployment {} for service {}",
            deployment.id, deployment.service_id
        );

        let mut event = NotificationEvent::new(
            "deployment.queued",
            NotificationLevel::Info,
            "Deployment queued",
            self.deployment_url(deployment.service_id, deployment.id),
        )
        .with_field("source", deployment.source.as_str());
        if let Some(sha) = &deployment.commit_sha {
            event = event.with_field("commit", sha.clone());
        }
        self.notifier.notify(event);

        Ok(deployment)
    }

    /// Fill the build environment: cache flag, deployment ID, resolved
    /// variables, registry credentials and pull secrets
    async fn populate_environment(
        &self,
        deployment: &Deployment,
        request: &mut DeploymentJobRequest,
    ) -> Result<(), DeployError> {
        let vars: &mut HashMap<String, String> = &mut request.env_vars;

        if request.no_cache {
            vars.insert(env::NO_CACHE.to_string(), "true".to_string());
        }
        vars.insert(env::DEPLOYMENT_ID.to_string(), deployment.id.to_string());

        let resolved = self.variables.resolve_all(request.service_id).await?;
        for (key, value) in resolved {
            if env::RESERVED.contains(&key.as_str()) {
                warn!(
                    "Service {} defines reserved variable {}, ignoring",
                    request.service_id, key
                );
                continue;
            }
            vars.insert(key, value);
        }

        let credentials = self.registry.credentials().await?;
        if credentials.registry_url.is_empty() || credentials.username.is_empty() {
            return Err(DeployError::RegistryError(
                "registry credentials are incomplete".to_string(),
            ));
        }
        vars.insert(env::REGISTRY_URL.to_string(), credentials.registry_url);
        vars.insert(env::REGISTRY_USERNAME.to_string(), credentials.username);
        vars.insert(
            env::REGISTRY_PASSWORD.to_string(),
            credentials.password.expose_secret().to_string(),
        );

        let pull_secrets = self.registry.image_pull_secrets(request.service_id).await?;
        if !pull_secrets.is_empty() {
            vars.insert(env::IMAGE_PULL_SECRETS.to_string(), pull_secrets.join(","));
        }

        Ok(())
    }

    /// Record `error` on the deployment, logging if that write fails too
    pub(crate) async fn fail_deployment(&self, deployment: &Deployment, error: &DeployError) {
        let message = error.to_string();
        if let Err(e) = self
            .store
            .mark_failed(deployment.id, &message, Utc::now())
            .await
        {
            error!(
                "Failed to record failure of deployment {}: {}",
                deployment.id, e
            );
        }

        self.notifier.notify(
            NotificationEvent::new(
                "deployment.failed",
                NotificationLevel::Error,
                "Deployment failed",
                self.deployment_url(deployment.service_id, deployment.id),
            )
            .with_field("error", message),
        );
    }

    /// Remove every queued and dependent item of `service_id` and mark the
    /// matching deployments `Cancelled`. Returns the cancelled deployment IDs.
    pub async fn cancel_existing_jobs(&self, service_id: Uuid) -> Result<Vec<Uuid>, DeployError> {
        let mut removed = Vec::new();

        for queue in [&self.deployment_queue, &self.dependent_queue] {
            let items = queue.get_all().await?;
            for item in items
                .into_iter()
                .filter(|item| item.payload.service_id == service_id)
            {
                queue.remove(&item.key).await?;
                match deployment_id_of(&item) {
                    Ok(id) => removed.push(id),
                    Err(e) => warn!("Removed unidentifiable item from '{}': {}", queue.name(), e),
                }
            }
        }

        if removed.is_empty() {
            return Ok(removed);
        }

        let changed = self.store.mark_cancelled(&removed).await?;
        info!(
            "Cancelled {} pending deployment(s) of service {} ({} updated)",
            removed.len(),
            service_id,
            changed
        );

        for id in &removed {
            self.notifier.notify(NotificationEvent::new(
                "deployment.cancelled",
                NotificationLevel::Warning,
                "Deployment cancelled",
                self.deployment_url(service_id, *id),
            ));
        }

        Ok(removed)
    }

    /// Create a `Pending` deployment and park it on the dependent queue until
    /// its prerequisites are healthy
    pub async fn enqueue_dependent_deployment(
        &self,
        request: DeploymentJobRequest,
    ) -> Result<Deployment, DeployError> {
        let _guard = self.service_locks.lock(request.service_id).await;
        let mut request = request;

        let deployment = self
            .store
            .create(NewDeployment::from_request(&request, BuildStatus::Pending))
            .await?;
        request.existing_deployment_id = Some(deployment.id);

        if let Err(e) = self
            .dependent_queue
            .enqueue(&deployment.id.to_string(), request)
            .await
        {
            self.fail_deployment(&deployment, &e).await;
            return Err(e);
        }

        info!(
            "Deployment {} of service {} waiting on dependencies",
            deployment.id, deployment.service_id
        );
        Ok(deployment)
    }
}
