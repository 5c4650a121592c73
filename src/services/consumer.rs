use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::time::sleep;

use crate::config::ConsumerConfig;
use crate::models::job::JobStatus;
use crate::services::processor::JobProcessor;
use crate::services::queue::{Delivery, MessageQueue};

/// How a single message left the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Processed and acknowledged with the job's final status.
    Acked(JobStatus),
    /// Body was not a job; left unacknowledged.
    DecodeFailed,
    /// Processing or the ack failed; eligible for redelivery.
    Unacked,
}

/// Pulls job messages and processes a bounded number of them at once.
pub struct QueueConsumer {
    queue: Arc<dyn MessageQueue>,
    processor: Arc<JobProcessor>,
    permits: Arc<Semaphore>,
    config: ConsumerConfig,
}

impl QueueConsumer {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        processor: Arc<JobProcessor>,
        config: ConsumerConfig,
    ) -> Self {
        let concurrency = config.concurrency.max(1);
        Self {
            queue,
            processor,
            permits: Arc::new(Semaphore::new(concurrency)),
            config: ConsumerConfig {
                concurrency,
                ..config
            },
        }
    }

    /// Jobs currently being processed.
    pub fn in_flight(&self) -> usize {
        self.config.concurrency - self.permits.available_permits()
    }

    /// Consume for the lifetime of the process.
    pub async fn run(&self) {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Consume until `shutdown` resolves, then wait for in-flight jobs.
    ///
    /// A slot is reserved before each receive, so a saturated consumer never
    /// takes a message it cannot start.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        tracing::info!(
            concurrency = self.config.concurrency,
            "Consuming job messages"
        );

        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            match self.queue.receive().await {
                Ok(Some(delivery)) => {
                    let queue = Arc::clone(&self.queue);
                    let processor = Arc::clone(&self.processor);
                    metrics::gauge!("jobs_in_flight").increment(1.0);
                    tokio::spawn(async move {
                        handle_delivery(queue.as_ref(), &processor, delivery).await;
                        metrics::gauge!("jobs_in_flight").decrement(1.0);
                        drop(permit);
                    });
                    continue;
                }
                Ok(None) => {
                    tracing::trace!("No jobs available, sleeping");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to receive from queue, will retry");
                }
            }

            drop(permit);
            tokio::select! {
                _ = &mut shutdown => break,
                _ = sleep(self.config.poll_interval) => {}
            }
        }

        tracing::info!(in_flight = self.in_flight(), "Shutting down, draining in-flight jobs");
        let all = u32::try_from(self.config.concurrency).unwrap_or(u32::MAX);
        if let Ok(permits) = self.permits.acquire_many(all).await {
            drop(permits);
        }
        tracing::info!("Consumer stopped");
    }

    /// Decode, process and acknowledge one message on the current task.
    pub async fn handle(&self, delivery: Delivery) -> DeliveryOutcome {
        handle_delivery(self.queue.as_ref(), &self.processor, delivery).await
    }
}

async fn handle_delivery(
    queue: &dyn MessageQueue,
    processor: &JobProcessor,
    delivery: Delivery,
) -> DeliveryOutcome {
    metrics::counter!("jobs_received_total").increment(1);

    let job = match delivery.decode() {
        Ok(job) => job,
        Err(e) => {
            metrics::counter!("jobs_decode_failed_total").increment(1);
            tracing::error!(
                error = %e,
                payload_bytes = delivery.payload.len(),
                "Failed to decode job message, leaving it unacknowledged"
            );
            return DeliveryOutcome::DecodeFailed;
        }
    };

    let job_id = job.job_id;
    let start = Instant::now();

    let report = match processor.process(job).await {
        Ok(report) => report,
        Err(e) => {
            metrics::counter!("jobs_unacked_total").increment(1);
            tracing::error!(job_id, error = %e, "Job processing failed, leaving message unacknowledged");
            return DeliveryOutcome::Unacked;
        }
    };

    metrics::histogram!("job_processing_seconds").record(start.elapsed().as_secs_f64());
    match report.status {
        JobStatus::Failed => metrics::counter!("jobs_failed_total").increment(1),
        _ => metrics::counter!("jobs_completed_total").increment(1),
    }

    if let Err(e) = queue.ack(&delivery).await {
        metrics::counter!("jobs_unacked_total").increment(1);
        tracing::error!(job_id, error = %e, "Failed to acknowledge message");
        return DeliveryOutcome::Unacked;
    }

    tracing::info!(
        job_id,
        status = %report.status,
        duration_ms = start.elapsed().as_millis() as u64,
        "Acknowledged message"
    );
    DeliveryOutcome::Acked(report.status)
}
