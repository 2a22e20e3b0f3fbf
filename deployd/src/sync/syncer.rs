//! Deployment status synchronization

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::deploy::fsm::BuildStatus;
use crate::errors::DeployError;
use crate::models::deployment::Deployment;
use crate::models::platform::JobCondition;
use crate::notify::{DeploymentLinks, NotificationEvent, NotificationLevel, Notifier};
use crate::services::platform::OrchestrationPlatform;
use crate::store::DeploymentStore;

/// Outcome of one synchronization sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Running deployments with a job name that were queried
    pub checked: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Still in flight on the platform
    pub unchanged: usize,
    /// Running deployments without a job name yet
    pub skipped: usize,
    pub errors: usize,
}

/// What happened to one deployment during a sweep
enum Outcome {
    Succeeded,
    Failed,
    Unchanged,
}

/// Folds platform job outcomes back into deployment records
pub struct StatusSynchronizer {
    store: Arc<dyn DeploymentStore>,
    platform: Arc<dyn OrchestrationPlatform>,
    notifier: Notifier,
    links: DeploymentLinks,
}

impl StatusSynchronizer {
    pub fn new(
        store: Arc<dyn DeploymentStore>,
        platform: Arc<dyn OrchestrationPlatform>,
        notifier: Notifier,
        links: DeploymentLinks,
    ) -> Self {
        Self {
            store,
            platform,
            notifier,
            links,
        }
    }

    /// Reconcile every running deployment with its platform job.
    ///
    /// Only loading the running set can fail the sweep; errors on individual
    /// deployments are logged, counted and skipped.
    pub async fn sync_job_statuses(&self) -> Result<SyncReport, DeployError> {
        let running = self.store.get_by_status(BuildStatus::Running).await?;
        let mut report = SyncReport::default();

        for deployment in running {
            let Some(job_name) = deployment.job_name.clone() else {
                report.skipped += 1;
                continue;
            };
            report.checked += 1;

            match self.sync_one(&deployment, &job_name).await {
                Ok(Outcome::Succeeded) => report.succeeded += 1,
                Ok(Outcome::Failed) => report.failed += 1,
                Ok(Outcome::Unchanged) => report.unchanged += 1,
                Err(e) => {
                    error!(
                        "Failed to sync deployment {} (job {}): {}",
                        deployment.id, job_name, e
                    );
                    report.errors += 1;
                }
            }
        }

        debug!("Status sync finished: {:?}", report);
        Ok(report)
    }

    async fn sync_one(
        &self,
        deployment: &Deployment,
        job_name: &str,
    ) -> Result<Outcome, DeployError> {
        let status = self.platform.get_job_status(job_name).await?;
        let completed_at = status.completed_at.unwrap_or_else(Utc::now);

        match status.condition {
            JobCondition::Succeeded => {
                self.store.mark_succeeded(deployment.id, completed_at).await?;
                info!("Deployment {} succeeded", deployment.id);
                self.notifier.notify(NotificationEvent::new(
                    "deployment.succeeded",
                    NotificationLevel::Success,
                    "Deployment succeeded",
                    self.links.deployment(deployment.service_id, deployment.id),
                ));
                Ok(Outcome::Succeeded)
            }
            JobCondition::Failed { reason } => {
                self.store
                    .mark_failed(deployment.id, &reason, completed_at)
                    .await?;
                warn!("Deployment {} failed: {}", deployment.id, reason);
                self.notifier.notify(
                    NotificationEvent::new(
                        "deployment.failed",
                        NotificationLevel::Error,
                        "Deployment failed",
                        self.links.deployment(deployment.service_id, deployment.id),
                    )
                    .with_field("error", reason),
                );
                Ok(Outcome::Failed)
            }
            JobCondition::Other { raw } => {
                if deployment.raw_status.as_deref() != Some(raw.as_str()) {
                    self.store.set_raw_status(deployment.id, &raw).await?;
                }
                Ok(Outcome::Unchanged)
            }
        }
    }
}
