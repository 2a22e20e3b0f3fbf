//! Dependency gate tests

use uuid::Uuid;

use deployd::models::platform::WorkloadHealth;

use crate::common::{dependent_request, Harness, NAMESPACE, SERVICE_LABEL};

#[tokio::test]
async fn test_no_dependencies_is_ready() {
    let harness = Harness::new();
    let request = dependent_request(Uuid::new_v4(), vec![]);

    assert!(harness.controller.are_dependencies_ready(&request).await);
    assert!(harness.platform.health_queries().is_empty());
}

#[tokio::test]
async fn test_active_dependency_is_ready() {
    let harness = Harness::new();
    let dependency = Uuid::new_v4();
    harness.platform.set_health(dependency, WorkloadHealth::Active);

    let request = dependent_request(Uuid::new_v4(), vec![dependency]);
    assert!(harness.controller.are_dependencies_ready(&request).await);

    assert_eq!(
        harness.platform.health_queries(),
        vec![(
            NAMESPACE.to_string(),
            format!("{}={}", SERVICE_LABEL, dependency)
        )]
    );
}

#[tokio::test]
async fn test_crashing_dependency_is_not_ready() {
    let harness = Harness::new();
    let dependency = Uuid::new_v4();
    harness.platform.set_health(dependency, WorkloadHealth::Crashing);

    let request = dependent_request(Uuid::new_v4(), vec![dependency]);
    assert!(!harness.controller.are_dependencies_ready(&request).await);
}

#[tokio::test]
async fn test_every_dependency_must_be_active() {
    let harness = Harness::new();
    let healthy = Uuid::new_v4();
    let deploying = Uuid::new_v4();
    harness.platform.set_health(healthy, WorkloadHealth::Active);
    harness.platform.set_health(deploying, WorkloadHealth::Deploying);

    let request = dependent_request(Uuid::new_v4(), vec![healthy, deploying]);
    assert!(!harness.controller.are_dependencies_ready(&request).await);

    harness.platform.set_health(deploying, WorkloadHealth::Active);
    assert!(harness.controller.are_dependencies_ready(&request).await);
}

#[tokio::test]
async fn test_health_error_is_not_ready() {
    let harness = Harness::new();
    let dependency = Uuid::new_v4();
    harness.platform.fail_health(dependency, "gateway timeout");

    let request = dependent_request(Uuid::new_v4(), vec![dependency]);
    assert!(!harness.controller.are_dependencies_ready(&request).await);
}

#[tokio::test]
async fn test_unresolved_variables_are_not_ready() {
    let harness = Harness::new();
    let service_id = Uuid::new_v4();
    harness.resolver.fail_for(service_id);

    let request = dependent_request(service_id, vec![]);
    assert!(!harness.controller.are_dependencies_ready(&request).await);

    harness.resolver.heal(service_id);
    assert!(harness.controller.are_dependencies_ready(&request).await);
}
