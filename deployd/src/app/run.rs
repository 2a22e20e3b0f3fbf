//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions, NotificationOptions};
use crate::controller::{Collaborators, DeploymentController, DeploymentQueue};
use crate::errors::DeployError;
use crate::http::client::HttpClient;
use crate::http::platform::HttpPlatformClient;
use crate::http::registry::HttpRegistryProvider;
use crate::http::variables::HttpVariableResolver;
use crate::models::deployment::DeploymentJobRequest;
use crate::notify::dispatcher;
use crate::notify::webhook::WebhookSink;
use crate::notify::Notifier;
use crate::queue::redis::RedisJobQueue;
use crate::store::postgres::PgDeploymentStore;

/// Run the deployment daemon until `shutdown_signal` resolves
pub async fn run(
    version: String,
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), DeployError> {
    info!("Initializing deployd {}...", version);

    let mut shutdown_manager = ShutdownManager::new(options.lifecycle.clone());

    if let Err(e) = init(&options, &mut shutdown_manager).await {
        error!("Failed to start deployd: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), DeployError> {
    let notifier = init_notifications(&options.notifications, shutdown_manager)?;
    let collaborators = init_collaborators(options, notifier).await?;

    let controller = Arc::new(DeploymentController::new(
        collaborators,
        options.controller.clone(),
        shutdown_manager.controller_token(),
    ));
    controller.start().await?;
    shutdown_manager.with_controller(controller)?;

    info!("deployd running");
    Ok(())
}

async fn init_collaborators(
    options: &AppOptions,
    notifier: Notifier,
) -> Result<Collaborators, DeployError> {
    info!("Connecting deployment store...");
    let store = PgDeploymentStore::connect(&options.database.url, options.database.max_connections)
        .await?;
    store.ensure_schema().await?;

    info!("Connecting job queues...");
    let deployment_queue: DeploymentQueue = Arc::new(
        RedisJobQueue::<DeploymentJobRequest>::connect(
            &options.redis_url,
            options.deployment_queue.clone(),
        )
        .await?,
    );
    let dependent_queue: DeploymentQueue = Arc::new(
        RedisJobQueue::<DeploymentJobRequest>::connect(
            &options.redis_url,
            options.dependent_queue.clone(),
        )
        .await?,
    );

    let upstream = &options.upstream;
    let client = |url: &str| {
        HttpClient::new(url, upstream.api_token.clone(), upstream.request_timeout)
    };

    Ok(Collaborators {
        store: Arc::new(store),
        platform: Arc::new(HttpPlatformClient::new(client(&upstream.platform_url)?)),
        variables: Arc::new(HttpVariableResolver::new(client(&upstream.variables_url)?)),
        registry: Arc::new(HttpRegistryProvider::new(client(&upstream.registry_url)?)),
        deployment_queue,
        dependent_queue,
        notifier,
    })
}

fn init_notifications(
    options: &NotificationOptions,
    shutdown_manager: &mut ShutdownManager,
) -> Result<Notifier, DeployError> {
    let Some(webhook_url) = &options.webhook_url else {
        info!("No webhook configured, notifications disabled");
        return Ok(Notifier::disabled());
    };

    info!("Initializing notification dispatcher...");
    let sink = Arc::new(WebhookSink::new(webhook_url, options.timeout)?);
    let (notifier, rx) = Notifier::channel(options.channel_capacity);

    let dispatcher_options = options.dispatcher.clone();
    let token = shutdown_manager.dispatcher_token();
    let handle = tokio::spawn(async move {
        dispatcher::run(
            &dispatcher_options,
            rx,
            sink,
            tokio::time::sleep,
            Box::pin(token.cancelled_owned()),
        )
        .await;
    });

    shutdown_manager.with_dispatcher_handle(handle)?;
    Ok(notifier)
}

// ================================= SHUTDOWN ===================================== //

/// Stops the controller before the dispatcher so late notifications still go out
struct ShutdownManager {
    lifecycle_options: LifecycleOptions,
    controller_token: CancellationToken,
    dispatcher_token: CancellationToken,
    controller: Option<Arc<DeploymentController>>,
    dispatcher_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    fn new(lifecycle_options: LifecycleOptions) -> Self {
        Self {
            lifecycle_options,
            controller_token: CancellationToken::new(),
            dispatcher_token: CancellationToken::new(),
            controller: None,
            dispatcher_handle: None,
        }
    }

    fn controller_token(&self) -> CancellationToken {
        self.controller_token.clone()
    }

    fn dispatcher_token(&self) -> CancellationToken {
        self.dispatcher_token.clone()
    }

    fn with_controller(&mut self, controller: Arc<DeploymentController>) -> Result<(), DeployError> {
        if self.controller.is_some() {
            return Err(DeployError::ShutdownError("controller already set".to_string()));
        }
        self.controller = Some(controller);
        Ok(())
    }

    fn with_dispatcher_handle(&mut self, handle: JoinHandle<()>) -> Result<(), DeployError> {
        if self.dispatcher_handle.is_some() {
            return Err(DeployError::ShutdownError(
                "dispatcher_handle already set".to_string(),
            ));
        }
        self.dispatcher_handle = Some(handle);
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), DeployError> {
        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), DeployError> {
        info!("Shutting down deployd...");

        // 1. Controller and its workers
        self.controller_token.cancel();
        if let Some(controller) = self.controller.take() {
            controller.stop().await?;
        }

        // 2. Notification dispatcher
        self.dispatcher_token.cancel();
        if let Some(handle) = self.dispatcher_handle.take() {
            handle
                .await
                .map_err(|e| DeployError::ShutdownError(e.to_string()))?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
