//! Build status state machine tests

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use deployd::deploy::fsm::{BuildEvent, BuildStatus};
use deployd::errors::DeployError;
use deployd::models::deployment::{DeploymentSource, NewDeployment};
use deployd::store::memory::MemoryDeploymentStore;
use deployd::store::DeploymentStore;

#[test]
fn test_fsm_success_flow() {
    let status = BuildStatus::Pending;

    let status = status.next(&BuildEvent::Enqueue).unwrap();
    assert_eq!(status, BuildStatus::Queued);

    let status = status.next(&BuildEvent::Start).unwrap();
    assert_eq!(status, BuildStatus::Running);

    let status = status.next(&BuildEvent::Succeed).unwrap();
    assert_eq!(status, BuildStatus::Succeeded);
    assert!(status.is_terminal());
}

#[test]
fn test_fsm_cancel_from_every_live_state() {
    for status in [BuildStatus::Pending, BuildStatus::Queued, BuildStatus::Running] {
        assert_eq!(
            status.next(&BuildEvent::Cancel).unwrap(),
            BuildStatus::Cancelled
        );
    }
}

#[test]
fn test_fsm_terminal_states_are_final() {
    let events = [
        BuildEvent::Enqueue,
        BuildEvent::Start,
        BuildEvent::Succeed,
        BuildEvent::Fail("late".to_string()),
        BuildEvent::Cancel,
    ];
    for status in BuildStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
        for event in &events {
            assert!(
                matches!(status.next(event), Err(DeployError::InvalidTransition(_))),
                "{} accepted {:?}",
                status,
                event
            );
        }
    }
}

#[test]
fn test_fsm_invalid_transition() {
    // Pending deployments are promoted through Queued, never started directly
    assert!(BuildStatus::Pending.next(&BuildEvent::Start).is_err());
    assert!(BuildStatus::Queued.next(&BuildEvent::Succeed).is_err());
}

#[tokio::test]
async fn test_store_follows_state_machine() {
    let store = MemoryDeploymentStore::new();
    let deployment = store
        .create(NewDeployment {
            service_id: Uuid::new_v4(),
            status: BuildStatus::Pending,
            source: DeploymentSource::Redeploy,
            commit_sha: None,
            commit_message: None,
            commit_author: None,
        })
        .await
        .unwrap();
    assert!(deployment.queued_at.is_none());

    let queued = store.mark_queued(deployment.id).await.unwrap();
    assert_eq!(queued.status, BuildStatus::Queued);
    assert!(queued.queued_at.is_some());

    let started_at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    store.mark_started(deployment.id, started_at).await.unwrap();

    let failed_at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 5, 0).unwrap();
    store
        .mark_failed(deployment.id, "exit code 137", failed_at)
        .await
        .unwrap();

    let record = store.get_by_id(deployment.id).await.unwrap();
    assert_eq!(record.status, BuildStatus::Failed);
    assert_eq!(record.error.as_deref(), Some("exit code 137"));
    assert_eq!(record.started_at, Some(started_at));
    assert_eq!(record.completed_at, Some(failed_at));

    let result = store.mark_succeeded(deployment.id, Utc::now()).await;
    assert!(matches!(result, Err(DeployError::InvalidTransition(_))));
}
