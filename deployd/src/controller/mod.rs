//! Deployment controller
//!
//! Owns both job queues and drives every deployment from request to platform
//! job. Background work (the two queue consumers and the status synchronizer)
//! is started by [`DeploymentController::start`] and stopped through the
//! cancellation token handed to the constructor.

pub mod enqueue;
pub mod gate;
pub mod locks;
pub mod process;

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::controller::gate::DependencyGate;
use crate::controller::locks::ServiceLocks;
use crate::errors::DeployError;
use crate::models::deployment::DeploymentJobRequest;
use crate::notify::{DeploymentLinks, Notifier};
use crate::queue::processor::{self, AdmissionFn, ProcessFn};
use crate::queue::{JobQueue, QueueItem};
use crate::services::platform::OrchestrationPlatform;
use crate::services::registry::RegistryProvider;
use crate::services::variables::VariableResolver;
use crate::store::DeploymentStore;
use crate::sync::syncer::StatusSynchronizer;
use crate::workers::status_sync;

/// Queue of deployment job requests
pub type DeploymentQueue = Arc<dyn JobQueue<DeploymentJobRequest>>;

/// Everything the controller talks to
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn DeploymentStore>,
    pub platform: Arc<dyn OrchestrationPlatform>,
    pub variables: Arc<dyn VariableResolver>,
    pub registry: Arc<dyn RegistryProvider>,
    pub deployment_queue: DeploymentQueue,
    pub dependent_queue: DeploymentQueue,
    pub notifier: Notifier,
}

/// Controller options
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Namespace queried for dependency health
    pub namespace: String,

    /// Label carrying the service ID on platform workloads
    pub service_label: String,

    /// Base URL for links in notifications
    pub dashboard_url: String,

    /// Deployment queue consumer
    pub deployment_processor: processor::Options,

    /// Dependent queue consumer
    pub dependent_processor: processor::Options,

    /// Status synchronizer schedule
    pub status_sync: status_sync::Options,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            service_label: "deployd.io/service-id".to_string(),
            dashboard_url: "http://localhost:3000".to_string(),
            deployment_processor: processor::Options::default(),
            dependent_processor: processor::Options {
                poll_interval: std::time::Duration::from_secs(10),
                ..Default::default()
            },
            status_sync: status_sync::Options::default(),
        }
    }
}

/// The deployment orchestration engine
pub struct DeploymentController {
    store: Arc<dyn DeploymentStore>,
    platform: Arc<dyn OrchestrationPlatform>,
    variables: Arc<dyn VariableResolver>,
    registry: Arc<dyn RegistryProvider>,
    deployment_queue: DeploymentQueue,
    dependent_queue: DeploymentQueue,
    notifier: Notifier,
    links: DeploymentLinks,
    gate: DependencyGate,
    syncer: Arc<StatusSynchronizer>,
    service_locks: ServiceLocks,
    options: ControllerOptions,
    shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl DeploymentController {
    /// Create a controller; background work stops when `shutdown` is cancelled
    pub fn new(
        collaborators: Collaborators,
        options: ControllerOptions,
        shutdown: CancellationToken,
    ) -> Self {
        let links = DeploymentLinks::new(&options.dashboard_url);
        let gate = DependencyGate::new(
            collaborators.variables.clone(),
            collaborators.platform.clone(),
            options.namespace.clone(),
            options.service_label.clone(),
        );
        let syncer = Arc::new(StatusSynchronizer::new(
            collaborators.store.clone(),
            collaborators.platform.clone(),
            collaborators.notifier.clone(),
            links.clone(),
        ));

        Self {
            store: collaborators.store,
            platform: collaborators.platform,
            variables: collaborators.variables,
            registry: collaborators.registry,
            deployment_queue: collaborators.deployment_queue,
            dependent_queue: collaborators.dependent_queue,
            notifier: collaborators.notifier,
            links,
            gate,
            syncer,
            service_locks: ServiceLocks::default(),
            options,
            shutdown,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// The status synchronizer run by this controller
    pub fn syncer(&self) -> Arc<StatusSynchronizer> {
        self.syncer.clone()
    }

    /// Whether `request`'s prerequisites are satisfied
    pub async fn are_dependencies_ready(&self, request: &DeploymentJobRequest) -> bool {
        self.gate.are_dependencies_ready(request).await
    }

    /// Spawn both queue consumers and the status synchronizer
    pub async fn start(self: &Arc<Self>) -> Result<(), DeployError> {
        let mut handles = self.handles.lock().await;
        if !handles.is_empty() {
            return Err(DeployError::ShutdownError(
                "controller already started".to_string(),
            ));
        }
        if self.shutdown.is_cancelled() {
            return Err(DeployError::ShutdownError(
                "controller already stopped".to_string(),
            ));
        }

        info!("Starting deployment controller...");

        let controller = Arc::clone(self);
        let process_fn: ProcessFn<DeploymentJobRequest> =
            Arc::new(move |item: QueueItem<DeploymentJobRequest>| {
                let controller = controller.clone();
                async move { controller.process_job(item).await }.boxed()
            });
        let platform = self.platform.clone();
        let admission_fn: AdmissionFn = Arc::new(move || {
            let platform = platform.clone();
            async move { platform.count_active_jobs().await }.boxed()
        });
        handles.push(self.spawn_processor(
            self.options.deployment_processor.clone(),
            self.deployment_queue.clone(),
            process_fn,
            Some(admission_fn),
        ));

        let controller = Arc::clone(self);
        let dependent_fn: ProcessFn<DeploymentJobRequest> =
            Arc::new(move |item: QueueItem<DeploymentJobRequest>| {
                let controller = controller.clone();
                async move { controller.process_dependent_job(item).await }.boxed()
            });
        handles.push(self.spawn_processor(
            self.options.dependent_processor.clone(),
            self.dependent_queue.clone(),
            dependent_fn,
            None,
        ));

        let syncer = self.syncer.clone();
        let sync_options = self.options.status_sync.clone();
        let shutdown = self.shutdown.clone();
        handles.push(tokio::spawn(async move {
            status_sync::run(
                &sync_options,
                syncer.as_ref(),
                tokio::time::sleep,
                Box::pin(shutdown.cancelled_owned()),
            )
            .await;
        }));

        Ok(())
    }

    fn spawn_processor(
        &self,
        options: processor::Options,
        queue: DeploymentQueue,
        process_fn: ProcessFn<DeploymentJobRequest>,
        admission_fn: Option<AdmissionFn>,
    ) -> JoinHandle<()> {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            processor::run(
                &options,
                queue,
                process_fn,
                admission_fn,
                tokio::time::sleep,
                Box::pin(shutdown.cancelled_owned()),
            )
            .await;
        })
    }

    /// Signal shutdown and wait for background work to finish
    pub async fn stop(&self) -> Result<(), DeployError> {
        info!("Stopping deployment controller...");
        self.shutdown.cancel();

        let handles: Vec<JoinHandle<()>> = self.handles.lock().await.drain(..).collect();
        for handle in handles {
            handle
                .await
                .map_err(|e| DeployError::ShutdownError(e.to_string()))?;
        }

        info!("Deployment controller stopped");
        Ok(())
    }

    fn deployment_url(&self, service_id: Uuid, deployment_id: Uuid) -> String {
        self.links.deployment(service_id, deployment_id)
    }
}

/// Deployment ID carried by a queue item: the key, or the payload reference
pub(crate) fn deployment_id_of(item: &QueueItem<DeploymentJobRequest>) -> Result<Uuid, DeployError> {
    Uuid::parse_str(&item.key)
        .ok()
        .or(item.payload.existing_deployment_id)
        .ok_or_else(|| {
            DeployError::QueueError(format!("queue key '{}' is not a deployment ID", item.key))
        })
}
