//! Fakes and a controller harness shared by the unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use deployd::controller::{Collaborators, ControllerOptions, DeploymentController};
use deployd::deploy::fsm::BuildStatus;
use deployd::errors::DeployError;
use deployd::models::deployment::{Deployment, DeploymentJobRequest, DeploymentSource, NewDeployment};
use deployd::models::platform::{JobStatus, RegistryCredentials, WorkloadHealth};
use deployd::notify::{NotificationEvent, Notifier};
use deployd::queue::memory::MemoryJobQueue;
use deployd::services::platform::OrchestrationPlatform;
use deployd::services::registry::RegistryProvider;
use deployd::services::variables::VariableResolver;
use deployd::store::memory::MemoryDeploymentStore;
use deployd::store::DeploymentStore;

pub const NAMESPACE: &str = "default";
pub const SERVICE_LABEL: &str = "deployd.io/service-id";

// ================================= PLATFORM ===================================== //

#[derive(Default)]
struct PlatformState {
    health: HashMap<Uuid, WorkloadHealth>,
    health_errors: HashMap<Uuid, String>,
    job_statuses: HashMap<String, Result<JobStatus, String>>,
    create_error: Option<String>,
    active_jobs: usize,
    created: Vec<(Uuid, HashMap<String, String>)>,
    cancelled_services: Vec<Uuid>,
    health_queries: Vec<(String, String)>,
}

/// Scriptable orchestration platform
#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<PlatformState>,
}

impl FakePlatform {
    fn state(&self) -> std::sync::MutexGuard<'_, PlatformState> {
        self.state.lock().unwrap()
    }

    pub fn set_health(&self, service_id: Uuid, health: WorkloadHealth) {
        self.state().health.insert(service_id, health);
    }

    pub fn fail_health(&self, service_id: Uuid, message: &str) {
        self.state()
            .health_errors
            .insert(service_id, message.to_string());
    }

    pub fn set_job_status(&self, job_name: &str, status: JobStatus) {
        self.state()
            .job_statuses
            .insert(job_name.to_string(), Ok(status));
    }

    pub fn fail_job_status(&self, job_name: &str, message: &str) {
        self.state()
            .job_statuses
            .insert(job_name.to_string(), Err(message.to_string()));
    }

    pub fn fail_create(&self, message: &str) {
        self.state().create_error = Some(message.to_string());
    }

    pub fn set_active_jobs(&self, count: usize) {
        self.state().active_jobs = count;
    }

    pub fn created(&self) -> Vec<(Uuid, HashMap<String, String>)> {
        self.state().created.clone()
    }

    pub fn cancelled_services(&self) -> Vec<Uuid> {
        self.state().cancelled_services.clone()
    }

    pub fn health_queries(&self) -> Vec<(String, String)> {
        self.state().health_queries.clone()
    }

    pub fn job_name_for(deployment_id: Uuid) -> String {
        format!("build-{}", deployment_id)
    }
}

#[async_trait]
impl OrchestrationPlatform for FakePlatform {
    async fn create_build_job(
        &self,
        deployment_id: Uuid,
        env: &HashMap<String, String>,
    ) -> Result<String, DeployError> {
        let mut state = self.state();
        if let Some(message) = &state.create_error {
            return Err(DeployError::PlatformError(message.clone()));
        }
        state.created.push((deployment_id, env.clone()));
        Ok(Self::job_name_for(deployment_id))
    }

    async fn cancel_build_jobs(&self, service_id: Uuid) -> Result<(), DeployError> {
        self.state().cancelled_services.push(service_id);
        Ok(())
    }

    async fn get_job_status(&self, job_name: &str) -> Result<JobStatus, DeployError> {
        match self.state().job_statuses.get(job_name) {
            Some(Ok(status)) => Ok(status.clone()),
            Some(Err(message)) => Err(DeployError::PlatformError(message.clone())),
            None => Err(DeployError::NotFound(format!("job {}", job_name))),
        }
    }

    async fn get_live_health(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<WorkloadHealth, DeployError> {
        let mut state = self.state();
        state
            .health_queries
            .push((namespace.to_string(), selector.to_string()));

        let service_id = selector
            .split_once('=')
            .and_then(|(_, id)| Uuid::parse_str(id).ok())
            .ok_or_else(|| DeployError::PlatformError(format!("bad selector {}", selector)))?;

        if let Some(message) = state.health_errors.get(&service_id) {
            return Err(DeployError::PlatformError(message.clone()));
        }
        Ok(state
            .health
            .get(&service_id)
            .cloned()
            .unwrap_or(WorkloadHealth::Unknown("NotFound".to_string())))
    }

    async fn count_active_jobs(&self) -> Result<usize, DeployError> {
        Ok(self.state().active_jobs)
    }
}

// ============================ RESOLVER / REGISTRY =============================== //

/// Variable resolver returning fixed variables, or failing for chosen services
#[derive(Default)]
pub struct FakeResolver {
    variables: Mutex<HashMap<String, String>>,
    failing: Mutex<Vec<Uuid>>,
}

impl FakeResolver {
    pub fn set_variable(&self, key: &str, value: &str) {
        self.variables
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn fail_for(&self, service_id: Uuid) {
        self.failing.lock().unwrap().push(service_id);
    }

    pub fn heal(&self, service_id: Uuid) {
        self.failing.lock().unwrap().retain(|id| *id != service_id);
    }
}

#[async_trait]
impl VariableResolver for FakeResolver {
    async fn resolve_all(&self, service_id: Uuid) -> Result<HashMap<String, String>, DeployError> {
        if self.failing.lock().unwrap().contains(&service_id) {
            return Err(DeployError::VariableResolution(format!(
                "unresolved reference ${{{{other.DATABASE_URL}}}} in {}",
                service_id
            )));
        }
        Ok(self.variables.lock().unwrap().clone())
    }
}

/// Registry with fixed credentials
pub struct FakeRegistry {
    pub username: String,
    pub pull_secrets: Vec<String>,
}

impl Default for FakeRegistry {
    fn default() -> Self {
        Self {
            username: "builder".to_string(),
            pull_secrets: vec!["regcred".to_string(), "mirror".to_string()],
        }
    }
}

#[async_trait]
impl RegistryProvider for FakeRegistry {
    async fn credentials(&self) -> Result<RegistryCredentials, DeployError> {
        Ok(RegistryCredentials {
            registry_url: "registry.example.com".to_string(),
            username: self.username.clone(),
            password: SecretString::from("hunter2".to_string()),
        })
    }

    async fn image_pull_secrets(&self, _service_id: Uuid) -> Result<Vec<String>, DeployError> {
        Ok(self.pull_secrets.clone())
    }
}

// =================================== STORE ====================================== //

/// Memory store that counts every write
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryDeploymentStore,
    writes: AtomicUsize,
}

impl CountingStore {
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn all(&self) -> Vec<Deployment> {
        self.inner.all()
    }

    pub fn of_service(&self, service_id: Uuid) -> Vec<Deployment> {
        self.all()
            .into_iter()
            .filter(|d| d.service_id == service_id)
            .collect()
    }

    fn wrote(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeploymentStore for CountingStore {
    async fn create(&self, new: NewDeployment) -> Result<Deployment, DeployError> {
        self.wrote();
        self.inner.create(new).await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Deployment, DeployError> {
        self.inner.get_by_id(id).await
    }

    async fn get_by_status(&self, status: BuildStatus) -> Result<Vec<Deployment>, DeployError> {
        self.inner.get_by_status(status).await
    }

    async fn get_active_by_service(
        &self,
        service_id: Uuid,
    ) -> Result<Vec<Deployment>, DeployError> {
        self.inner.get_active_by_service(service_id).await
    }

    async fn mark_queued(&self, id: Uuid) -> Result<Deployment, DeployError> {
        self.wrote();
        self.inner.mark_queued(id).await
    }

    async fn mark_started(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DeployError> {
        self.wrote();
        self.inner.mark_started(id, at).await
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DeployError> {
        self.wrote();
        self.inner.mark_failed(id, error, at).await
    }

    async fn mark_succeeded(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DeployError> {
        self.wrote();
        self.inner.mark_succeeded(id, at).await
    }

    async fn mark_cancelled(&self, ids: &[Uuid]) -> Result<u64, DeployError> {
        self.wrote();
        self.inner.mark_cancelled(ids).await
    }

    async fn assign_job_name(&self, id: Uuid, job_name: &str) -> Result<(), DeployError> {
        self.wrote();
        self.inner.assign_job_name(id, job_name).await
    }

    async fn set_raw_status(&self, id: Uuid, raw: &str) -> Result<(), DeployError> {
        self.wrote();
        self.inner.set_raw_status(id, raw).await
    }
}

// ================================== HARNESS ===================================== //

/// A controller wired to fakes, with handles on every collaborator
pub struct Harness {
    pub controller: Arc<DeploymentController>,
    pub store: Arc<CountingStore>,
    pub platform: Arc<FakePlatform>,
    pub resolver: Arc<FakeResolver>,
    pub deployment_queue: Arc<MemoryJobQueue<DeploymentJobRequest>>,
    pub dependent_queue: Arc<MemoryJobQueue<DeploymentJobRequest>>,
    pub notifications: mpsc::Receiver<NotificationEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(FakeRegistry::default(), options())
    }

    pub fn with_registry(registry: FakeRegistry) -> Self {
        Self::with(registry, options())
    }

    pub fn with(registry: FakeRegistry, options: ControllerOptions) -> Self {
        let store = Arc::new(CountingStore::default());
        let platform = Arc::new(FakePlatform::default());
        let resolver = Arc::new(FakeResolver::default());
        let deployment_queue = Arc::new(MemoryJobQueue::new("deployments"));
        let dependent_queue = Arc::new(MemoryJobQueue::new("dependents"));
        let (notifier, notifications) = Notifier::channel(256);

        let collaborators = Collaborators {
            store: store.clone(),
            platform: platform.clone(),
            variables: resolver.clone(),
            registry: Arc::new(registry),
            deployment_queue: deployment_queue.clone(),
            dependent_queue: dependent_queue.clone(),
            notifier,
        };
        let controller = Arc::new(DeploymentController::new(
            collaborators,
            options,
            CancellationToken::new(),
        ));

        Self {
            controller,
            store,
            platform,
            resolver,
            deployment_queue,
            dependent_queue,
            notifications,
        }
    }

    /// Every notification emitted since the last drain
    pub fn drain_notifications(&mut self) -> Vec<NotificationEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.notifications.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Controller options pointing at the fake namespace and dashboard
pub fn options() -> ControllerOptions {
    ControllerOptions {
        namespace: NAMESPACE.to_string(),
        service_label: SERVICE_LABEL.to_string(),
        dashboard_url: "https://dash.example.com/".to_string(),
        ..Default::default()
    }
}

pub fn request(service_id: Uuid) -> DeploymentJobRequest {
    let mut request = DeploymentJobRequest::new(service_id, DeploymentSource::GitPush);
    request.commit_sha = Some("3f2a9c1".to_string());
    request.commit_message = Some("Bump dependencies".to_string());
    request.committer = Some("dev@example.com".to_string());
    request
}

pub fn dependent_request(service_id: Uuid, depends_on: Vec<Uuid>) -> DeploymentJobRequest {
    let mut request = request(service_id);
    request.depends_on = depends_on;
    request
}

/// At most one queued or running deployment per service
pub fn assert_at_most_one_active(store: &CountingStore) {
    let mut active: HashMap<Uuid, usize> = HashMap::new();
    for deployment in store.all() {
        if deployment.status.is_active() {
            *active.entry(deployment.service_id).or_default() += 1;
        }
    }
    for (service_id, count) in active {
        assert!(
            count <= 1,
            "service {} has {} active deployments",
            service_id,
            count
        );
    }
}
