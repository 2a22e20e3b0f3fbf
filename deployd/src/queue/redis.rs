//! Redis queue backend
//!
//! Layout per queue `<name>`:
//! - `<name>:items` hash, key -> JSON payload
//! - `<name>:order` list of keys, oldest at the head
//!
//! Writes touching both structures run in a `MULTI/EXEC` pipeline; dequeue runs
//! as one Lua script so a key never leaves the order list without its payload.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::errors::DeployError;
use crate::queue::{JobQueue, QueueItem};
use crate::utils::redact_url;

/// Redis-backed durable queue
pub struct RedisJobQueue<T> {
    name: String,
    connection_manager: redis::aio::ConnectionManager,
    _payload: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for RedisJobQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisJobQueue")
            .field("name", &self.name)
            .field("connection_manager", &"ConnectionManager")
            .finish()
    }
}

impl<T> RedisJobQueue<T> {
    /// Connect to Redis and bind to queue `name`
    pub async fn connect(url: &str, name: impl Into<String>) -> Result<Self, DeployError> {
        let client = redis::Client::open(url).map_err(|e| {
            DeployError::QueueError(format!("Failed to create Redis client: {}", e))
        })?;
        let connection_manager = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| DeployError::QueueError(format!("Failed to connect to Redis: {}", e)))?;

        let queue = Self::with_connection(connection_manager, name);
        debug!(url = %redact_url(url), queue = %queue.name, "Redis queue connected");
        Ok(queue)
    }

    /// Bind to queue `name` over an existing connection
    pub fn with_connection(
        connection_manager: redis::aio::ConnectionManager,
        name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            connection_manager,
            _payload: PhantomData,
        }
    }

    fn items_key(&self) -> String {
        items_key(&self.name)
    }

    fn order_key(&self) -> String {
        order_key(&self.name)
    }
}

/// Pop the oldest key together with its payload.
///
/// Order entries left behind by a concurrent remove are discarded.
const DEQUEUE_SCRIPT: &str = r#"
while true do
  local key = redis.call('LPOP', KEYS[1])
  if not key then
    return false
  end
  local payload = redis.call('HGET', KEYS[2], key)
  if payload then
    redis.call('HDEL', KEYS[2], key)
    return {key, payload}
  end
end
"#;

fn items_key(name: &str) -> String {
    format!("{}:items", name)
}

fn order_key(name: &str) -> String {
    format!("{}:order", name)
}

#[async_trait]
impl<T> JobQueue<T> for RedisJobQueue<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn enqueue(&self, key: &str, payload: T) -> Result<(), DeployError> {
        let json = serde_json::to_string(&payload)?;
        let mut conn = self.connection_manager.clone();

        redis::pipe()
            .atomic()
            .cmd("LREM")
            .arg(self.order_key())
            .arg(0)
            .arg(key)
            .ignore()
            .cmd("RPUSH")
            .arg(self.order_key())
            .arg(key)
            .ignore()
            .cmd("HSET")
            .arg(self.items_key())
            .arg(key)
            .arg(json)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        debug!(queue = %self.name, key = key, "Enqueued");
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<QueueItem<T>>, DeployError> {
        let mut conn = self.connection_manager.clone();

        let keys: Vec<String> = redis::cmd("LRANGE")
            .arg(self.order_key())
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let payloads: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(self.items_key())
            .arg(&keys)
            .query_async(&mut conn)
            .await?;

        let mut items = Vec::with_capacity(keys.len());
        for (key, payload) in keys.into_iter().zip(payloads) {
            let Some(json) = payload else {
                warn!(queue = %self.name, key = %key, "Order entry without payload, skipping");
                continue;
            };
            match serde_json::from_str(&json) {
                Ok(payload) => items.push(QueueItem { key, payload }),
                Err(e) => {
                    warn!(queue = %self.name, key = %key, "Undecodable payload, skipping: {}", e)
                }
            }
        }
        Ok(items)
    }

    async fn remove(&self, key: &str) -> Result<(), DeployError> {
        let mut conn = self.connection_manager.clone();

        redis::pipe()
            .atomic()
            .cmd("LREM")
            .arg(self.order_key())
            .arg(0)
            .arg(key)
            .ignore()
            .cmd("HDEL")
            .arg(self.items_key())
            .arg(key)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        debug!(queue = %self.name, key = key, "Removed");
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<QueueItem<T>>, DeployError> {
        let mut conn = self.connection_manager.clone();

        let popped: Option<(String, String)> = redis::Script::new(DEQUEUE_SCRIPT)
            .key(self.order_key())
            .key(self.items_key())
            .invoke_async(&mut conn)
            .await?;
        let Some((key, json)) = popped else {
            return Ok(None);
        };

        let payload = serde_json::from_str(&json).map_err(|e| {
            DeployError::QueueError(format!(
                "Undecodable payload for {} in {}: {}",
                key, self.name, e
            ))
        })?;
        Ok(Some(QueueItem { key, payload }))
    }

    async fn len(&self) -> Result<usize, DeployError> {
        let mut conn = self.connection_manager.clone();
        let len: usize = redis::cmd("HLEN")
            .arg(self.items_key())
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }
}
