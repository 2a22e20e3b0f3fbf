//! In-memory deployment store

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::deploy::fsm::{BuildEvent, BuildStatus};
use crate::errors::DeployError;
use crate::models::deployment::{Deployment, NewDeployment};
use crate::store::DeploymentStore;

/// Deployment store kept in process memory
#[derive(Default)]
pub struct MemoryDeploymentStore {
    records: RwLock<HashMap<Uuid, Deployment>>,
}

impl MemoryDeploymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record, oldest first
    pub fn all(&self) -> Vec<Deployment> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<Deployment> = records.values().cloned().collect();
        all.sort_by_key(|d| d.created_at);
        all
    }

    fn update<F>(&self, id: Uuid, f: F) -> Result<Deployment, DeployError>
    where
        F: FnOnce(&mut Deployment) -> Result<(), DeployError>,
    {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let record = records
            .get_mut(&id)
            .ok_or_else(|| DeployError::NotFound(format!("deployment {}", id)))?;
        f(record)?;
        Ok(record.clone())
    }

    fn transition(&self, id: Uuid, event: BuildEvent, at: DateTime<Utc>) -> Result<Deployment, DeployError> {
        self.update(id, |record| {
            record.status = record.status.next(&event)?;
            match event {
                BuildEvent::Enqueue => record.queued_at = Some(at),
                BuildEvent::Start => record.started_at = Some(at),
                BuildEvent::Succeed | BuildEvent::Cancel => record.completed_at = Some(at),
                BuildEvent::Fail(error) => {
                    record.error = Some(error);
                    record.completed_at = Some(at);
                }
            }
            Ok(())
        })
    }
}

#[async_trait]
impl DeploymentStore for MemoryDeploymentStore {
    async fn create(&self, new: NewDeployment) -> Result<Deployment, DeployError> {
        let now = Utc::now();
        let deployment = Deployment {
            id: Uuid::new_v4(),
            service_id: new.service_id,
            status: new.status,
            source: new.source,
            commit_sha: new.commit_sha,
            commit_message: new.commit_message,
            commit_author: new.commit_author,
            image: None,
            job_name: None,
            error: None,
            raw_status: None,
            created_at: now,
            queued_at: (new.status == BuildStatus::Queued).then_some(now),
            started_at: None,
            completed_at: None,
        };

        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(deployment.id, deployment.clone());
        Ok(deployment)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Deployment, DeployError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records
            .get(&id)
            .cloned()
            .ok_or_else(|| DeployError::NotFound(format!("deployment {}", id)))
    }

    async fn get_by_status(&self, status: BuildStatus) -> Result<Vec<Deployment>, DeployError> {
        Ok(self.all().into_iter().filter(|d| d.status == status).collect())
    }

    async fn get_active_by_service(
        &self,
        service_id: Uuid,
    ) -> Result<Vec<Deployment>, DeployError> {
        Ok(self
            .all()
            .into_iter()
            .filter(|d| d.service_id == service_id && !d.status.is_terminal())
            .collect())
    }

    async fn mark_queued(&self, id: Uuid) -> Result<Deployment, DeployError> {
        self.transition(id, BuildEvent::Enqueue, Utc::now())
    }

    async fn mark_started(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DeployError> {
        self.transition(id, BuildEvent::Start, at).map(|_| ())
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DeployError> {
        self.transition(id, BuildEvent::Fail(error.to_string()), at)
            .map(|_| ())
    }

    async fn mark_succeeded(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DeployError> {
        self.transition(id, BuildEvent::Succeed, at).map(|_| ())
    }

    async fn mark_cancelled(&self, ids: &[Uuid]) -> Result<u64, DeployError> {
        let now = Utc::now();
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let mut changed = 0;
        for id in ids {
            if let Some(record) = records.get_mut(id) {
                if let Ok(next) = record.status.next(&BuildEvent::Cancel) {
                    record.status = next;
                    record.completed_at = Some(now);
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn assign_job_name(&self, id: Uuid, job_name: &str) -> Result<(), DeployError> {
        self.update(id, |record| {
            record.job_name = Some(job_name.to_string());
            Ok(())
        })
        .map(|_| ())
    }

    async fn set_raw_status(&self, id: Uuid, raw: &str) -> Result<(), DeployError> {
        self.update(id, |record| {
            record.raw_status = Some(raw.to_string());
            Ok(())
        })
        .map(|_| ())
    }
}
