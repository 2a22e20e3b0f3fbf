//! Queue consumers: building admitted jobs and promoting dependent ones

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::controller::{deployment_id_of, DeploymentController};
use crate::deploy::fsm::BuildStatus;
use crate::errors::DeployError;
use crate::models::deployment::DeploymentJobRequest;
use crate::queue::QueueItem;

impl DeploymentController {
    /// Hand a dequeued deployment to the platform.
    ///
    /// Items whose deployment is no longer `Queued` are dropped without side
    /// effects. A failed job creation marks the deployment `Failed`; the item is
    /// not retried.
    pub async fn process_job(
        &self,
        item: QueueItem<DeploymentJobRequest>,
    ) -> Result<(), DeployError> {
        let deployment_id = deployment_id_of(&item)?;
        let service_id = item.payload.service_id;

        // Claim the deployment before touching anything else of the service
        match self.store.mark_started(deployment_id, Utc::now()).await {
            Ok(()) => {}
            Err(DeployError::InvalidTransition(reason)) => {
                info!(
                    "Dropping stale item for deployment {}: {}",
                    deployment_id, reason
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        self.supersede_admitted(service_id, deployment_id).await?;

        let job_name = match self
            .platform
            .create_build_job(deployment_id, &item.payload.env_vars)
            .await
        {
            Ok(job_name) => job_name,
            Err(e) => {
                error!(
                    "Failed to create build job for deployment {}: {}",
                    deployment_id, e
                );
                let deployment = self.store.get_by_id(deployment_id).await?;
                self.fail_deployment(&deployment, &e).await;
                return Err(e);
            }
        };

        self.store.assign_job_name(deployment_id, &job_name).await?;
        info!(
            "Deployment {} of service {} running as job {}",
            deployment_id, service_id, job_name
        );
        Ok(())
    }

    /// Cancel every other queued or running deployment of the service and the
    /// platform's in-flight builds for it
    async fn supersede_admitted(
        &self,
        service_id: Uuid,
        deployment_id: Uuid,
    ) -> Result<(), DeployError> {
        let others: Vec<Uuid> = self
            .store
            .get_active_by_service(service_id)
            .await?
            .into_iter()
            .filter(|d| d.id != deployment_id && d.status.is_active())
            .map(|d| d.id)
            .collect();

        if !others.is_empty() {
            let changed = self.store.mark_cancelled(&others).await?;
            info!(
                "Superseded {} deployment(s) of service {} by {}",
                changed, service_id, deployment_id
            );
        }

        if let Err(e) = self.platform.cancel_build_jobs(service_id).await {
            warn!(
                "Failed to cancel in-flight builds of service {}: {}",
                service_id, e
            );
        }
        Ok(())
    }

    /// Promote a dependent deployment once its prerequisites are healthy;
    /// otherwise put it back on the dependent queue under the same key.
    pub async fn process_dependent_job(
        &self,
        item: QueueItem<DeploymentJobRequest>,
    ) -> Result<(), DeployError> {
        let deployment_id = deployment_id_of(&item)?;

        match self.store.get_by_id(deployment_id).await {
            Ok(deployment) if deployment.status.is_terminal() => {
                info!(
                    "Dropping dependent deployment {}, already {}",
                    deployment_id, deployment.status
                );
                return Ok(());
            }
            Ok(_) => {}
            Err(DeployError::NotFound(_)) => {
                warn!("Dropping dependent item for unknown deployment {}", deployment_id);
                return Ok(());
            }
            Err(e) => {
                self.dependent_queue.enqueue(&item.key, item.payload).await?;
                return Err(e);
            }
        }

        if !self.are_dependencies_ready(&item.payload).await {
            debug!(
                "Dependencies of deployment {} not ready, requeueing",
                deployment_id
            );
            return self.dependent_queue.enqueue(&item.key, item.payload).await;
        }

        let mut payload = item.payload.clone();
        payload.existing_deployment_id = Some(deployment_id);

        if let Err(e) = self.enqueue_deployment_job(payload).await {
            // Keep waiting if promotion failed before the deployment left Pending
            if matches!(
                self.store.get_by_id(deployment_id).await,
                Ok(deployment) if deployment.status == BuildStatus::Pending
            ) {
                self.dependent_queue.enqueue(&item.key, item.payload).await?;
            }
            return Err(e);
        }

        info!("Promoted dependent deployment {}", deployment_id);
        Ok(())
    }
}
