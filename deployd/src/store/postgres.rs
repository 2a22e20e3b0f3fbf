//! Postgres deployment store
//!
//! Status updates are guarded by the set of statuses the target may be
//! reached from, so the database enforces the same transition table as
//! [`BuildStatus`]. A guarded update that touches no row is reported as an
//! invalid transition (or not-found when the row is missing).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use tracing::debug;
use uuid::Uuid;

use crate::deploy::fsm::BuildStatus;
use crate::errors::DeployError;
use crate::models::deployment::{Deployment, DeploymentSource, NewDeployment};
use crate::store::DeploymentStore;
use crate::utils::redact_url;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS deployments (
    id              UUID PRIMARY KEY,
    service_id      UUID NOT NULL,
    status          TEXT NOT NULL,
    source          TEXT NOT NULL,
    commit_sha      TEXT,
    commit_message  TEXT,
    commit_author   TEXT,
    image           TEXT,
    job_name        TEXT,
    error           TEXT,
    raw_status      TEXT,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
    queued_at       TIMESTAMPTZ,
    started_at      TIMESTAMPTZ,
    completed_at    TIMESTAMPTZ
);
CREATE INDEX IF NOT EXISTS deployments_service_status_idx ON deployments (service_id, status);
CREATE INDEX IF NOT EXISTS deployments_status_idx ON deployments (status);
"#;

const COLUMNS: &str = "id, service_id, status, source, commit_sha, commit_message, commit_author, \
     image, job_name, error, raw_status, created_at, queued_at, started_at, completed_at";

#[derive(Debug, FromRow)]
struct DeploymentRow {
    id: Uuid,
    service_id: Uuid,
    status: String,
    source: String,
    commit_sha: Option<String>,
    commit_message: Option<String>,
    commit_author: Option<String>,
    image: Option<String>,
    job_name: Option<String>,
    error: Option<String>,
    raw_status: Option<String>,
    created_at: DateTime<Utc>,
    queued_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<DeploymentRow> for Deployment {
    type Error = DeployError;

    fn try_from(row: DeploymentRow) -> Result<Self, Self::Error> {
        Ok(Deployment {
            id: row.id,
            service_id: row.service_id,
            status: row.status.parse()?,
            source: DeploymentSource::parse(&row.source).unwrap_or_default(),
            commit_sha: row.commit_sha,
            commit_message: row.commit_message,
            commit_author: row.commit_author,
            image: row.image,
            job_name: row.job_name,
            error: row.error,
            raw_status: row.raw_status,
            created_at: row.created_at,
            queued_at: row.queued_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

fn status_strings(statuses: &[BuildStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

/// Deployment store backed by Postgres
#[derive(Debug, Clone)]
pub struct PgDeploymentStore {
    pool: PgPool,
}

impl PgDeploymentStore {
    /// Connect a pool to `database_url`
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, DeployError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        debug!(url = %redact_url(database_url), "Deployment store connected");
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the deployments table and indexes if missing
    pub async fn ensure_schema(&self) -> Result<(), DeployError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Explain why a guarded update touched no row
    async fn rejected_update(&self, id: Uuid, target: BuildStatus) -> DeployError {
        match self.get_by_id(id).await {
            Ok(current) => DeployError::InvalidTransition(format!(
                "deployment {}: {} -> {}",
                id, current.status, target
            )),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl DeploymentStore for PgDeploymentStore {
    async fn create(&self, new: NewDeployment) -> Result<Deployment, DeployError> {
        let sql = format!(
            "INSERT INTO deployments (id, service_id, status, source, commit_sha, commit_message, \
             commit_author, queued_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, CASE WHEN $3 = 'queued' THEN now() END) \
             RETURNING {}",
            COLUMNS
        );
        let row = sqlx::query_as::<_, DeploymentRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(new.service_id)
            .bind(new.status.as_str())
            .bind(new.source.as_str())
            .bind(new.commit_sha)
            .bind(new.commit_message)
            .bind(new.commit_author)
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Deployment, DeployError> {
        let sql = format!("SELECT {} FROM deployments WHERE id = $1", COLUMNS);
        let row = sqlx::query_as::<_, DeploymentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DeployError::NotFound(format!("deployment {}", id)))?;
        row.try_into()
    }

    async fn get_by_status(&self, status: BuildStatus) -> Result<Vec<Deployment>, DeployError> {
        let sql = format!(
            "SELECT {} FROM deployments WHERE status = $1 ORDER BY created_at",
            COLUMNS
        );
        let rows = sqlx::query_as::<_, DeploymentRow>(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Deployment::try_from).collect()
    }

    async fn get_active_by_service(
        &self,
        service_id: Uuid,
    ) -> Result<Vec<Deployment>, DeployError> {
        let sql = format!(
            "SELECT {} FROM deployments WHERE service_id = $1 AND status = ANY($2) \
             ORDER BY created_at",
            COLUMNS
        );
        let active = status_strings(&[
            BuildStatus::Pending,
            BuildStatus::Queued,
            BuildStatus::Running,
        ]);
        let rows = sqlx::query_as::<_, DeploymentRow>(&sql)
            .bind(service_id)
            .bind(active)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Deployment::try_from).collect()
    }

    async fn mark_queued(&self, id: Uuid) -> Result<Deployment, DeployError> {
        let sql = format!(
            "UPDATE deployments SET status = 'queued', queued_at = now() \
             WHERE id = $1 AND status = ANY($2) RETURNING {}",
            COLUMNS
        );
        let row = sqlx::query_as::<_, DeploymentRow>(&sql)
            .bind(id)
            .bind(status_strings(&BuildStatus::sources_of(BuildStatus::Queued)))
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => row.try_into(),
            None => Err(self.rejected_update(id, BuildStatus::Queued).await),
        }
    }

    async fn mark_started(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DeployError> {
        let result = sqlx::query(
            "UPDATE deployments SET status = 'running', started_at = $2 \
             WHERE id = $1 AND status = ANY($3)",
        )
        .bind(id)
        .bind(at)
        .bind(status_strings(&BuildStatus::sources_of(BuildStatus::Running)))
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(self.rejected_update(id, BuildStatus::Running).await);
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DeployError> {
        let result = sqlx::query(
            "UPDATE deployments SET status = 'failed', error = $2, completed_at = $3 \
             WHERE id = $1 AND status = ANY($4)",
        )
        .bind(id)
        .bind(error)
        .bind(at)
        .bind(status_strings(&BuildStatus::sources_of(BuildStatus::Failed)))
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(self.rejected_update(id, BuildStatus::Failed).await);
        }
        Ok(())
    }

    async fn mark_succeeded(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DeployError> {
        let result = sqlx::query(
            "UPDATE deployments SET status = 'succeeded', completed_at = $2 \
             WHERE id = $1 AND status = ANY($3)",
        )
        .bind(id)
        .bind(at)
        .bind(status_strings(&BuildStatus::sources_of(BuildStatus::Succeeded)))
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(self.rejected_update(id, BuildStatus::Succeeded).await);
        }
        Ok(())
    }

    async fn mark_cancelled(&self, ids: &[Uuid]) -> Result<u64, DeployError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "UPDATE deployments SET status = 'cancelled', completed_at = now() \
             WHERE id = ANY($1) AND status = ANY($2)",
        )
        .bind(ids)
        .bind(status_strings(&BuildStatus::sources_of(BuildStatus::Cancelled)))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn assign_job_name(&self, id: Uuid, job_name: &str) -> Result<(), DeployError> {
        let result = sqlx::query("UPDATE deployments SET job_name = $2 WHERE id = $1")
            .bind(id)
            .bind(job_name)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DeployError::NotFound(format!("deployment {}", id)));
        }
        Ok(())
    }

    async fn set_raw_status(&self, id: Uuid, raw: &str) -> Result<(), DeployError> {
        let result = sqlx::query("UPDATE deployments SET raw_status = $2 WHERE id = $1")
            .bind(id)
            .bind(raw)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DeployError::NotFound(format!("deployment {}", id)));
        }
        Ok(())
    }
}
