//! Durable notification queue.
//!
//! Reserving moves a message from the pending list to a processing list; it
//! leaves processing only when acked or re-queued for retry. Messages a
//! crashed worker left in processing go back to pending on the next start.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

use crate::config::RedisConfig;
use crate::models::QueuedNotification;

/// A reserved message. `receipt` is the exact payload held in the processing
/// list and identifies the message for ack/retry.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub notification: QueuedNotification,
    pub receipt: String,
}

#[async_trait]
pub trait NotificationQueue: Send + Sync {
    async fn enqueue(&self, notification: &QueuedNotification) -> Result<(), anyhow::Error>;

    /// Wait up to `timeout` for a message.
    async fn reserve(&self, timeout: Duration) -> Result<Option<Reservation>, anyhow::Error>;

    async fn ack(&self, reservation: &Reservation) -> Result<(), anyhow::Error>;

    /// Atomically drop the reservation and queue `next` in its place.
    async fn retry(
        &self,
        reservation: &Reservation,
        next: &QueuedNotification,
    ) -> Result<(), anyhow::Error>;

    /// Move every in-flight message back to pending. Returns how many moved.
    async fn recover_inflight(&self) -> Result<u64, anyhow::Error>;
}

fn encode(notification: &QueuedNotification) -> Result<String, anyhow::Error> {
    serde_json::to_string(notification)
        .map_err(|e| anyhow::anyhow!("Failed to serialize notification: {}", e))
}

/// Redis-backed queue. `BRPOPLPUSH` parks its connection for the whole poll
/// timeout, so reserves run on their own connection and every other command
/// uses `manager`.
#[derive(Clone)]
pub struct RedisQueue {
    manager: ConnectionManager,
    blocking: ConnectionManager,
    pending_key: String,
    processing_key: String,
}

impl RedisQueue {
    pub fn new(manager: ConnectionManager, blocking: ConnectionManager, queue_key: &str) -> Self {
        Self {
            manager,
            blocking,
            pending_key: queue_key.to_string(),
            processing_key: format!("{}:processing", queue_key),
        }
    }

    /// Open the queue's two connections, separate from any cache connection.
    pub async fn connect(config: &RedisConfig, queue_key: &str) -> Result<Self, anyhow::Error> {
        let client = Client::open(config.url.clone())
            .map_err(|e| anyhow::anyhow!("Invalid Redis URL: {}", e))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect queue to Redis: {}", e))?;
        let blocking = client
            .get_connection_manager()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect queue to Redis: {}", e))?;
        tracing::info!(queue = %queue_key, "Notification queue connected");
        Ok(Self::new(manager, blocking, queue_key))
    }
}

#[async_trait]
impl NotificationQueue for RedisQueue {
    async fn enqueue(&self, notification: &QueuedNotification) -> Result<(), anyhow::Error> {
        let payload = encode(notification)?;
        let mut conn = self.manager.clone();
        redis::cmd("LPUSH")
            .arg(&self.pending_key)
            .arg(payload)
            .query_async::<_, i64>(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to enqueue notification: {}", e))?;
        Ok(())
    }

    async fn reserve(&self, timeout: Duration) -> Result<Option<Reservation>, anyhow::Error> {
        let mut conn = self.blocking.clone();
        let payload: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(&self.pending_key)
            .arg(&self.processing_key)
            .arg(timeout.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to reserve notification: {}", e))?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        match serde_json::from_str::<QueuedNotification>(&payload) {
            Ok(notification) => Ok(Some(Reservation {
                notification,
                receipt: payload,
            })),
            Err(e) => {
                tracing::error!(error = %e, "Discarding malformed notification payload");
                redis::cmd("LREM")
                    .arg(&self.processing_key)
                    .arg(1)
                    .arg(&payload)
                    .query_async::<_, i64>(&mut conn)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to discard notification: {}", e))?;
                Ok(None)
            }
        }
    }

    async fn ack(&self, reservation: &Reservation) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("LREM")
            .arg(&self.processing_key)
            .arg(1)
            .arg(&reservation.receipt)
            .query_async::<_, i64>(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to ack notification: {}", e))?;
        Ok(())
    }

    async fn retry(
        &self,
        reservation: &Reservation,
        next: &QueuedNotification,
    ) -> Result<(), anyhow::Error> {
        let payload = encode(next)?;
        let mut conn = self.manager.clone();
        redis::pipe()
            .atomic()
            .cmd("LREM")
            .arg(&self.processing_key)
            .arg(1)
            .arg(&reservation.receipt)
            .ignore()
            .cmd("LPUSH")
            .arg(&self.pending_key)
            .arg(payload)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to requeue notification: {}", e))
    }

    async fn recover_inflight(&self) -> Result<u64, anyhow::Error> {
        let mut conn = self.manager.clone();
        let mut moved = 0;
        loop {
            let payload: Option<String> = redis::cmd("RPOPLPUSH")
                .arg(&self.processing_key)
                .arg(&self.pending_key)
                .query_async(&mut conn)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to recover notifications: {}", e))?;
            if payload.is_none() {
                return Ok(moved);
            }
            moved += 1;
        }
    }
}

#[derive(Default)]
struct Lists {
    pending: VecDeque<String>,
    processing: Vec<String>,
}

/// In-process queue with the same pending/processing semantics.
#[derive(Default)]
pub struct MemoryQueue {
    lists: Mutex<Lists>,
    available: Notify,
    fail_enqueue: std::sync::atomic::AtomicBool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lists(&self) -> Result<std::sync::MutexGuard<'_, Lists>, anyhow::Error> {
        self.lists
            .lock()
            .map_err(|e| anyhow::anyhow!("Memory queue mutex poisoned: {}", e))
    }

    /// Make every following `enqueue` fail.
    pub fn set_fail_enqueue(&self, fail: bool) {
        self.fail_enqueue
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn pending(&self) -> Vec<QueuedNotification> {
        self.lists()
            .map(|l| {
                l.pending
                    .iter()
                    .rev()
                    .filter_map(|p| serde_json::from_str(p).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn processing_len(&self) -> usize {
        self.lists().map(|l| l.processing.len()).unwrap_or(0)
    }

    fn try_reserve(&self) -> Result<Option<Reservation>, anyhow::Error> {
        let mut lists = self.lists()?;
        while let Some(payload) = lists.pending.pop_back() {
            match serde_json::from_str::<QueuedNotification>(&payload) {
                Ok(notification) => {
                    lists.processing.push(payload.clone());
                    return Ok(Some(Reservation {
                        notification,
                        receipt: payload,
                    }));
                }
                Err(e) => tracing::error!(error = %e, "Discarding malformed notification payload"),
            }
        }
        Ok(None)
    }

    fn remove_processing(lists: &mut Lists, receipt: &str) {
        if let Some(index) = lists.processing.iter().position(|p| p == receipt) {
            lists.processing.remove(index);
        }
    }
}

#[async_trait]
impl NotificationQueue for MemoryQueue {
    async fn enqueue(&self, notification: &QueuedNotification) -> Result<(), anyhow::Error> {
        if self.fail_enqueue.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("Queue unavailable");
        }
        let payload = encode(notification)?;
        self.lists()?.pending.push_front(payload);
        self.available.notify_one();
        Ok(())
    }

    async fn reserve(&self, timeout: Duration) -> Result<Option<Reservation>, anyhow::Error> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(reservation) = self.try_reserve()? {
                return Ok(Some(reservation));
            }
            if tokio::time::timeout_at(deadline, self.available.notified())
                .await
                .is_err()
            {
                return self.try_reserve();
            }
        }
    }

    async fn ack(&self, reservation: &Reservation) -> Result<(), anyhow::Error> {
        Self::remove_processing(&mut *self.lists()?, &reservation.receipt);
        Ok(())
    }

    async fn retry(
        &self,
        reservation: &Reservation,
        next: &QueuedNotification,
    ) -> Result<(), anyhow::Error> {
        let payload = encode(next)?;
        {
            let mut lists = self.lists()?;
            Self::remove_processing(&mut lists, &reservation.receipt);
            lists.pending.push_front(payload);
        }
        self.available.notify_one();
        Ok(())
    }

    async fn recover_inflight(&self) -> Result<u64, anyhow::Error> {
        let moved = {
            let mut lists = self.lists()?;
            let inflight: Vec<String> = lists.processing.drain(..).collect();
            let moved = inflight.len() as u64;
            for payload in inflight {
                lists.pending.push_back(payload);
            }
            moved
        };
        if moved > 0 {
            self.available.notify_one();
        }
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationEvent;
    use uuid::Uuid;

    fn message() -> QueuedNotification {
        QueuedNotification::new(NotificationEvent::InvitationSent {
            invitation_id: Uuid::new_v4(),
        })
    }

    #[tokio::test]
    async fn fifo_reserve_and_ack() {
        let queue = MemoryQueue::new();
        let first = message();
        let second = message();
        queue.enqueue(&first).await.unwrap();
        queue.enqueue(&second).await.unwrap();

        let r1 = queue.reserve(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(r1.notification, first);
        assert_eq!(queue.processing_len(), 1);

        queue.ack(&r1).await.unwrap();
        assert_eq!(queue.processing_len(), 0);

        let r2 = queue.reserve(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(r2.notification, second);
    }

    #[tokio::test]
    async fn reserve_times_out_when_empty() {
        let queue = MemoryQueue::new();
        assert!(queue.reserve(Duration::from_millis(20)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reserve_wakes_on_enqueue() {
        let queue = std::sync::Arc::new(MemoryQueue::new());
        let producer = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.enqueue(&message()).await.unwrap();
        });
        assert!(queue.reserve(Duration::from_secs(5)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unacked_messages_are_recovered() {
        let queue = MemoryQueue::new();
        let original = message();
        queue.enqueue(&original).await.unwrap();
        let _lost = queue.reserve(Duration::from_millis(10)).await.unwrap().unwrap();

        assert_eq!(queue.recover_inflight().await.unwrap(), 1);
        let again = queue.reserve(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(again.notification, original);
    }

    #[tokio::test]
    async fn retry_replaces_the_reservation() {
        let queue = MemoryQueue::new();
        queue.enqueue(&message()).await.unwrap();
        let reservation = queue.reserve(Duration::from_millis(10)).await.unwrap().unwrap();

        let next = reservation.notification.next_attempt();
        queue.retry(&reservation, &next).await.unwrap();
        assert_eq!(queue.processing_len(), 0);
        assert_eq!(queue.pending(), vec![next]);
    }

    #[tokio::test]
    async fn connect_rejects_invalid_url() {
        let config = RedisConfig {
            url: "not a redis url".into(),
        };
        let err = RedisQueue::connect(&config, "notifications").await.err().unwrap();
        assert!(err.to_string().contains("Invalid Redis URL"));
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn blocking_reserve_does_not_stall_other_commands() {
        let config = RedisConfig {
            url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
        };
        let key = format!("test:notifications:{}", Uuid::new_v4());
        let queue = RedisQueue::connect(&config, &key).await.unwrap();

        let consumer = queue.clone();
        let waiting =
            tokio::spawn(async move { consumer.reserve(Duration::from_secs(3)).await.unwrap() });
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started = std::time::Instant::now();
        assert_eq!(queue.recover_inflight().await.unwrap(), 0);
        assert!(started.elapsed() < Duration::from_secs(1));

        queue.enqueue(&message()).await.unwrap();
        let reservation = waiting.await.unwrap().unwrap();
        queue.ack(&reservation).await.unwrap();
    }
}
