//! Redis list carrying JSON-encoded lifecycle events.

use std::time::Duration;

use bgpvpn_common::{DriverError, DriverResult};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::events::LifecycleEvent;

/// Event queue on a Redis list: producers `RPUSH`, the driver `BLPOP`s.
pub struct RedisEventQueue {
    connection: ConnectionManager,
    queue_key: String,
}

impl RedisEventQueue {
    pub async fn connect(uri: &str, queue_key: impl Into<String>) -> DriverResult<Self> {
        let queue_key = queue_key.into();
        let client = redis::Client::open(uri)
            .map_err(|e| DriverError::topology("connect event queue", e.to_string()))?;
        let connection = client
            .get_connection_manager()
            .await
            .map_err(|e| DriverError::topology("connect event queue", e.to_string()))?;

        info!("Listening for events on {} ({})", queue_key, uri);
        Ok(Self {
            connection,
            queue_key,
        })
    }

    /// Waits up to `timeout` for the next event.
    ///
    /// Returns `None` on timeout and on payloads that do not decode, which are
    /// logged and dropped.
    pub async fn pop(&self, timeout: Duration) -> DriverResult<Option<LifecycleEvent>> {
        let mut conn = self.connection.clone();
        let popped: Option<(String, String)> = conn
            .blpop(&self.queue_key, timeout.as_secs_f64())
            .await
            .map_err(|e| DriverError::topology("BLPOP", e.to_string()))?;

        let Some((_, payload)) = popped else {
            return Ok(None);
        };
        Ok(decode_event(&payload))
    }

    /// Appends an event to the queue
    pub async fn push(&self, event: &LifecycleEvent) -> DriverResult<()> {
        let payload = serde_json::to_string(event)
            .map_err(|e| DriverError::malformed(event.kind(), e.to_string()))?;
        let mut conn = self.connection.clone();
        let _: i64 = conn
            .rpush(&self.queue_key, payload)
            .await
            .map_err(|e| DriverError::topology("RPUSH", e.to_string()))?;
        debug!("Queued {} on {}", event.kind(), self.queue_key);
        Ok(())
    }
}

fn decode_event(payload: &str) -> Option<LifecycleEvent> {
    match serde_json::from_str(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Dropping undecodable event: {} ({})", e, payload);
            None
        }
    }
}
