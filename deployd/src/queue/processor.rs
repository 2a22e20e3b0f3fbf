//! Background queue consumer with admission control

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, error, info, warn};

use crate::errors::DeployError;
use crate::queue::{JobQueue, QueueItem};
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Handles one dequeued item
pub type ProcessFn<T> =
    Arc<dyn Fn(QueueItem<T>) -> BoxFuture<'static, Result<(), DeployError>> + Send + Sync>;

/// Reports how much work is currently active on the platform
pub type AdmissionFn = Arc<dyn Fn() -> BoxFuture<'static, Result<usize, DeployError>> + Send + Sync>;

/// Processor options
#[derive(Debug, Clone)]
pub struct Options {
    /// Delay between ticks
    pub poll_interval: Duration,

    /// Stop dequeuing while this many workloads are active
    pub max_active_workloads: usize,

    /// Backoff applied when the admission check itself fails
    pub admission_cooldown: CooldownOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_active_workloads: 4,
            admission_cooldown: CooldownOptions {
                base_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(60),
                multiplier: 2.0,
            },
        }
    }
}

/// Outcome of one processor tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Items were handed to the process function
    Processed(usize),
    /// Platform at capacity
    Deferred,
    /// Admission check failed
    AdmissionFailed,
}

/// Run the queue processor until `shutdown_signal` resolves.
///
/// Each tick processes at most as many items as the queue held when the tick
/// started, so items that re-enqueue themselves wait for the next tick.
pub async fn run<T, S, F>(
    options: &Options,
    queue: Arc<dyn JobQueue<T>>,
    process_fn: ProcessFn<T>,
    admission_fn: Option<AdmissionFn>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    T: Send + Sync + 'static,
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Queue processor '{}' starting...", queue.name());

    let mut err_streak: u32 = 0;

    loop {
        let wait = if err_streak == 0 {
            options.poll_interval
        } else {
            calc_exp_backoff(&options.admission_cooldown, err_streak - 1)
        };

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Queue processor '{}' shutting down...", queue.name());
                return;
            }
            _ = sleep_fn(wait) => {
                // Continue with tick
            }
        }

        match tick(options, queue.as_ref(), &process_fn, admission_fn.as_ref()).await {
            Tick::AdmissionFailed => err_streak = err_streak.saturating_add(1),
            Tick::Deferred => err_streak = 0,
            Tick::Processed(count) => {
                err_streak = 0;
                if count > 0 {
                    debug!("Queue '{}' processed {} item(s)", queue.name(), count);
                }
            }
        }
    }
}

/// Run a single processor tick
pub async fn tick<T>(
    options: &Options,
    queue: &dyn JobQueue<T>,
    process_fn: &ProcessFn<T>,
    admission_fn: Option<&AdmissionFn>,
) -> Tick
where
    T: Send + Sync + 'static,
{
    let budget = match queue.len().await {
        Ok(len) => len,
        Err(e) => {
            error!("Failed to read length of queue '{}': {}", queue.name(), e);
            return Tick::Processed(0);
        }
    };

    let mut processed = 0;
    while processed < budget {
        if let Some(admission_fn) = admission_fn {
            match admission_fn().await {
                Ok(active) if active >= options.max_active_workloads => {
                    debug!(
                        "Queue '{}' deferred: {} active workloads (max {})",
                        queue.name(),
                        active,
                        options.max_active_workloads
                    );
                    return if processed == 0 {
                        Tick::Deferred
                    } else {
                        Tick::Processed(processed)
                    };
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Admission check for queue '{}' failed: {}", queue.name(), e);
                    return Tick::AdmissionFailed;
                }
            }
        }

        let item = match queue.dequeue().await {
            Ok(Some(item)) => item,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to dequeue from '{}': {}", queue.name(), e);
                break;
            }
        };

        let key = item.key.clone();
        if let Err(e) = process_fn(item).await {
            error!("Processing '{}' from queue '{}' failed: {}", key, queue.name(), e);
        }
        processed += 1;
    }

    Tick::Processed(processed)
}
