//! In-process queue backend

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::errors::DeployError;
use crate::queue::{JobQueue, QueueItem};

struct Entries<T> {
    order: VecDeque<String>,
    payloads: HashMap<String, T>,
}

/// Non-durable queue with the same semantics as the Redis backend
pub struct MemoryJobQueue<T> {
    name: String,
    entries: RwLock<Entries<T>>,
}

impl<T> MemoryJobQueue<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(Entries {
                order: VecDeque::new(),
                payloads: HashMap::new(),
            }),
        }
    }
}

#[async_trait]
impl<T> JobQueue<T> for MemoryJobQueue<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn enqueue(&self, key: &str, payload: T) -> Result<(), DeployError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.order.retain(|k| k != key);
        entries.order.push_back(key.to_string());
        entries.payloads.insert(key.to_string(), payload);
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<QueueItem<T>>, DeployError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .order
            .iter()
            .filter_map(|key| {
                entries
                    .payloads
                    .get(key)
                    .map(|payload| QueueItem::new(key.clone(), payload.clone()))
            })
            .collect())
    }

    async fn remove(&self, key: &str) -> Result<(), DeployError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.order.retain(|k| k != key);
        entries.payloads.remove(key);
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<QueueItem<T>>, DeployError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        while let Some(key) = entries.order.pop_front() {
            if let Some(payload) = entries.payloads.remove(&key) {
                return Ok(Some(QueueItem::new(key, payload)));
            }
        }
        Ok(None)
    }

    async fn len(&self) -> Result<usize, DeployError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.payloads.len())
    }
}
