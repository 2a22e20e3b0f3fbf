//! Durable keyed job queues
//!
//! A queue holds `(key, payload)` pairs in insertion order. Keys are unique:
//! enqueuing under an existing key replaces the payload and moves the entry to
//! the tail. Two queues exist at runtime, one for jobs ready to build and one
//! for jobs waiting on other services.

pub mod memory;
pub mod processor;
pub mod redis;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

/// A keyed queue entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem<T> {
    pub key: String,
    pub payload: T,
}

impl<T> QueueItem<T> {
    pub fn new(key: impl Into<String>, payload: T) -> Self {
        Self {
            key: key.into(),
            payload,
        }
    }
}

/// Queue contract shared by the Redis and in-memory backends
#[async_trait]
pub trait JobQueue<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    /// Queue name, used in logs
    fn name(&self) -> &str;

    /// Store `payload` under `key`, replacing any previous entry
    async fn enqueue(&self, key: &str, payload: T) -> Result<(), DeployError>;

    /// Snapshot of every queued item in insertion order
    async fn get_all(&self) -> Result<Vec<QueueItem<T>>, DeployError>;

    /// Delete `key` if present; absent keys are not an error
    async fn remove(&self, key: &str) -> Result<(), DeployError>;

    /// Pop the oldest item
    async fn dequeue(&self) -> Result<Option<QueueItem<T>>, DeployError>;

    /// Number of queued items
    async fn len(&self) -> Result<usize, DeployError>;
}
