use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::models::job::JobSubmission;

/// A message taken off the queue and not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub payload: String,
}

impl Delivery {
    pub fn decode(&self) -> Result<JobSubmission, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

/// Durable queue with explicit acknowledgement.
///
/// A received message stays owned by the consumer until `ack`; messages
/// never acknowledged are eligible for redelivery.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn publish(&self, payload: &str) -> Result<(), QueueError>;

    /// Take the next pending message, if any.
    async fn receive(&self) -> Result<Option<Delivery>, QueueError>;

    /// Remove a received message for good.
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    async fn health_check(&self) -> Result<(), QueueError>;
}

/// Serialize and publish a job.
pub async fn publish_job(queue: &dyn MessageQueue, job: &JobSubmission) -> Result<(), QueueError> {
    let payload = serde_json::to_string(job).map_err(QueueError::Serialize)?;
    queue.publish(&payload).await
}

/// Redis-backed reliable queue.
///
/// `receive` moves a payload from the pending list onto this consumer's
/// processing list in one step; `ack` removes it from there.
pub struct RedisQueue {
    client: redis::Client,
    queue_key: String,
    processing_key: String,
}

impl RedisQueue {
    pub fn new(redis_url: &str, queue_name: &str, consumer_name: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self {
            client,
            queue_key: queue_name.to_string(),
            processing_key: format!("{}:processing:{}", queue_name, consumer_name),
        })
    }

    /// Get the current queue depth (pending jobs).
    pub async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let depth: u64 = conn.llen(&self.queue_key).await?;
        Ok(depth)
    }

    /// Return every unacknowledged message of this consumer to the pending
    /// list. Only safe while this consumer has nothing in flight.
    pub async fn recover_unacked(&self) -> Result<usize, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let mut recovered = 0;
        loop {
            let moved: Option<String> = conn.rpoplpush(&self.processing_key, &self.queue_key).await?;
            if moved.is_none() {
                break;
            }
            recovered += 1;
        }
        Ok(recovered)
    }
}

#[async_trait]
impl MessageQueue for RedisQueue {
    async fn publish(&self, payload: &str) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.lpush::<_, _, ()>(&self.queue_key, payload).await?;
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload: Option<String> = conn.rpoplpush(&self.queue_key, &self.processing_key).await?;
        Ok(payload.map(|payload| Delivery { payload }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.lrem::<_, _, ()>(&self.processing_key, 1, &delivery.payload)
            .await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

/// In-process queue with the same ack contract as [`RedisQueue`].
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<MemoryQueueState>,
}

#[derive(Default)]
struct MemoryQueueState {
    pending: VecDeque<String>,
    unacked: Vec<String>,
    acked: Vec<String>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn unacked(&self) -> Vec<String> {
        self.lock().unacked.clone()
    }

    pub fn acked(&self) -> Vec<String> {
        self.lock().acked.clone()
    }

    /// Put every unacknowledged message back at the end of the pending list.
    pub fn redeliver_unacked(&self) -> usize {
        let mut state = self.lock();
        let unacked = std::mem::take(&mut state.unacked);
        let count = unacked.len();
        state.pending.extend(unacked);
        count
    }

    fn lock(&self) -> MutexGuard<'_, MemoryQueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn publish(&self, payload: &str) -> Result<(), QueueError> {
        self.lock().pending.push_back(payload.to_string());
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Delivery>, QueueError> {
        let mut state = self.lock();
        let payload = state.pending.pop_front();
        if let Some(p) = &payload {
            state.unacked.push(p.clone());
        }
        Ok(payload.map(|payload| Delivery { payload }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut state = self.lock();
        if let Some(pos) = state.unacked.iter().position(|p| *p == delivery.payload) {
            let payload = state.unacked.remove(pos);
            state.acked.push(payload);
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_wire_format() {
        let delivery = Delivery {
            payload: r#"{"jobId": 42, "store_jobs": [{"store_id": "S1", "visit_time": "2024-03-01T09:30:00Z", "image_url": ["https://ok/a.png", "https://ok/b.jpg"]}]}"#.to_string(),
        };
        let job = delivery.decode().unwrap();
        assert_eq!(job.job_id, 42);
        assert_eq!(job.store_jobs[0].store_id, "S1");
        assert_eq!(job.store_jobs[0].image_urls.len(), 2);
        assert_eq!(job.image_count(), 2);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        let missing_id = Delivery {
            payload: r#"{"store_jobs": []}"#.to_string(),
        };
        assert!(missing_id.decode().is_err());

        let bad_time = Delivery {
            payload: r#"{"jobId": 1, "store_jobs": [{"store_id": "S1", "visit_time": "yesterday", "image_url": []}]}"#.to_string(),
        };
        assert!(bad_time.decode().is_err());
    }

    #[tokio::test]
    async fn test_memory_queue_ack_contract() {
        let queue = MemoryQueue::new();
        queue.publish("one").await.unwrap();
        queue.publish("two").await.unwrap();

        let first = queue.receive().await.unwrap().unwrap();
        let second = queue.receive().await.unwrap().unwrap();
        assert!(queue.receive().await.unwrap().is_none());

        queue.ack(&first).await.unwrap();
        assert_eq!(queue.acked(), vec!["one"]);
        assert_eq!(queue.unacked(), vec!["two"]);

        assert_eq!(queue.redeliver_unacked(), 1);
        let again = queue.receive().await.unwrap().unwrap();
        assert_eq!(again, second);
    }
}
