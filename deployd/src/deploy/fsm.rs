//! Finite state machine for deployment build status

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

/// Build status of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    /// Waiting in the dependent queue for prerequisites
    Pending,

    /// Waiting in the deployment queue
    Queued,

    /// Build workload handed to the platform
    Running,

    /// Platform reported success
    Succeeded,

    /// Rejected before queueing or failed on the platform
    Failed,

    /// Superseded by newer work for the same service
    Cancelled,
}

/// Deployment event
#[derive(Debug, Clone)]
pub enum BuildEvent {
    /// Admitted to the deployment queue
    Enqueue,

    /// Picked up by the queue consumer
    Start,

    /// Platform reported success
    Succeed,

    /// Anything that ends the attempt with an error
    Fail(String),

    /// Superseded
    Cancel,
}

impl BuildStatus {
    pub const ALL: [BuildStatus; 6] = [
        BuildStatus::Pending,
        BuildStatus::Queued,
        BuildStatus::Running,
        BuildStatus::Succeeded,
        BuildStatus::Failed,
        BuildStatus::Cancelled,
    ];

    /// Terminal states have no outgoing transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BuildStatus::Succeeded | BuildStatus::Failed | BuildStatus::Cancelled
        )
    }

    /// Queued or running work counts against the one-per-service invariant
    pub fn is_active(&self) -> bool {
        matches!(self, BuildStatus::Queued | BuildStatus::Running)
    }

    /// Compute the state reached by applying `event`
    pub fn next(self, event: &BuildEvent) -> Result<BuildStatus, DeployError> {
        let next = match (self, event) {
            // From Pending
            (BuildStatus::Pending, BuildEvent::Enqueue) => BuildStatus::Queued,
            (BuildStatus::Pending, BuildEvent::Fail(_)) => BuildStatus::Failed,
            (BuildStatus::Pending, BuildEvent::Cancel) => BuildStatus::Cancelled,

            // From Queued
            (BuildStatus::Queued, BuildEvent::Start) => BuildStatus::Running,
            (BuildStatus::Queued, BuildEvent::Fail(_)) => BuildStatus::Failed,
            (BuildStatus::Queued, BuildEvent::Cancel) => BuildStatus::Cancelled,

            // From Running
            (BuildStatus::Running, BuildEvent::Succeed) => BuildStatus::Succeeded,
            (BuildStatus::Running, BuildEvent::Fail(_)) => BuildStatus::Failed,
            (BuildStatus::Running, BuildEvent::Cancel) => BuildStatus::Cancelled,

            // Invalid transitions
            (state, event) => {
                return Err(DeployError::InvalidTransition(format!(
                    "{} -> {:?}",
                    state, event
                )));
            }
        };

        Ok(next)
    }

    /// Check whether `self -> target` is allowed by some event
    pub fn can_transition_to(&self, target: BuildStatus) -> bool {
        match (self, target) {
            (BuildStatus::Pending, BuildStatus::Queued) => true,
            (BuildStatus::Queued, BuildStatus::Running) => true,
            (BuildStatus::Running, BuildStatus::Succeeded) => true,
            (from, BuildStatus::Failed | BuildStatus::Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Statuses from which `target` can be reached
    pub fn sources_of(target: BuildStatus) -> Vec<BuildStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(target))
            .collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Pending => "pending",
            BuildStatus::Queued => "queued",
            BuildStatus::Running => "running",
            BuildStatus::Succeeded => "succeeded",
            BuildStatus::Failed => "failed",
            BuildStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildStatus {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BuildStatus::Pending),
            "queued" => Ok(BuildStatus::Queued),
            "running" => Ok(BuildStatus::Running),
            "succeeded" => Ok(BuildStatus::Succeeded),
            "failed" => Ok(BuildStatus::Failed),
            "cancelled" => Ok(BuildStatus::Cancelled),
            other => Err(DeployError::StoreError(format!(
                "Unknown build status: {}",
                other
            ))),
        }
    }
}
