//! Notification dispatcher worker

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::notify::{NotificationEvent, NotificationSink};
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Dispatcher options
#[derive(Debug, Clone)]
pub struct Options {
    /// Delivery attempts per event, including the first
    pub max_attempts: u32,

    /// Delay between attempts
    pub retry_cooldown: CooldownOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_cooldown: CooldownOptions {
                base_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(10),
                multiplier: 2.0,
            },
        }
    }
}

/// Run the dispatcher until shutdown or until every sender is dropped
pub async fn run<S, F>(
    options: &Options,
    mut rx: mpsc::Receiver<NotificationEvent>,
    sink: Arc<dyn NotificationSink>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Notification dispatcher starting...");

    loop {
        let event = tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Notification dispatcher shutting down...");
                return;
            }
            event = rx.recv() => event,
        };

        let Some(event) = event else {
            info!("Notification channel closed, dispatcher exiting...");
            return;
        };

        deliver_with_retry(options, sink.as_ref(), &event, &sleep_fn).await;
    }
}

/// Deliver one event, retrying with backoff. Returns whether it was delivered.
pub async fn deliver_with_retry<S, F>(
    options: &Options,
    sink: &dyn NotificationSink,
    event: &NotificationEvent,
    sleep_fn: &S,
) -> bool
where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    let attempts = options.max_attempts.max(1);
    for attempt in 0..attempts {
        match sink.deliver(event).await {
            Ok(()) => {
                debug!("Delivered notification '{}'", event.name);
                return true;
            }
            Err(e) if attempt + 1 < attempts => {
                warn!(
                    "Notification '{}' failed (attempt {}): {}",
                    event.name,
                    attempt + 1,
                    e
                );
                sleep_fn(calc_exp_backoff(&options.retry_cooldown, attempt)).await;
            }
            Err(e) => {
                error!(
                    "Giving up on notification '{}' after {} attempts: {}",
                    event.name, attempts, e
                );
            }
        }
    }
    false
}
