use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Prometheus scrape address exposed by worker processes
    #[serde(default = "default_worker_metrics_addr")]
    pub worker_metrics_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the job queue
    pub redis_url: String,

    /// Redis list holding pending job messages
    #[serde(default = "default_queue_name")]
    pub queue_name: String,

    /// Identifies this worker's processing list in Redis. Must be unique per
    /// worker replica and stable across its restarts: start-up recovery
    /// requeues everything in the list, including another live worker's
    /// in-flight messages when two replicas share a name.
    #[serde(default = "default_consumer_name")]
    pub consumer_name: String,

    /// Maximum number of jobs a worker processes at once
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Per-job cap on stores processed at once (0 = unbounded)
    #[serde(default = "default_store_concurrency")]
    pub store_concurrency: usize,

    /// Per-store cap on image fetches in flight (0 = unbounded)
    #[serde(default = "default_image_concurrency")]
    pub image_concurrency: usize,

    /// I/O timeout for a single image fetch
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Bytes read from an image body before giving up on its header
    #[serde(default = "default_max_header_bytes")]
    pub max_header_bytes: usize,

    /// Idle sleep between empty queue polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_worker_metrics_addr() -> String {
    "0.0.0.0:9100".to_string()
}

fn default_queue_name() -> String {
    "jobs_schedule".to_string()
}

pub const DEFAULT_CONSUMER_NAME: &str = "image-processor";

fn default_consumer_name() -> String {
    DEFAULT_CONSUMER_NAME.to_string()
}

fn default_worker_concurrency() -> usize {
    10
}

fn default_store_concurrency() -> usize {
    16
}

fn default_image_concurrency() -> usize {
    8
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_max_header_bytes() -> usize {
    4 * 1024 * 1024
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// True when `CONSUMER_NAME` was left unset, so replicas would collide.
    pub fn uses_default_consumer_name(&self) -> bool {
        self.consumer_name == DEFAULT_CONSUMER_NAME
    }

    pub fn processor(&self) -> ProcessorConfig {
        ProcessorConfig {
            store_concurrency: self.store_concurrency,
            image_concurrency: self.image_concurrency,
        }
    }

    pub fn consumer(&self) -> ConsumerConfig {
        ConsumerConfig {
            concurrency: self.worker_concurrency.max(1),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    pub fn fetcher(&self) -> FetcherConfig {
        FetcherConfig {
            timeout: Duration::from_secs(self.fetch_timeout_secs),
            max_header_bytes: self.max_header_bytes,
        }
    }
}

/// Fan-out limits applied inside a single job. Zero disables a limit.
#[derive(Debug, Clone, Copy)]
pub struct ProcessorConfig {
    pub store_concurrency: usize,
    pub image_concurrency: usize,
}

impl ProcessorConfig {
    /// No caps at either level: every store and every image runs at once.
    pub fn unbounded() -> Self {
        Self {
            store_concurrency: 0,
            image_concurrency: 0,
        }
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            store_concurrency: default_store_concurrency(),
            image_concurrency: default_image_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConsumerConfig {
    pub concurrency: usize,
    pub poll_interval: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_worker_concurrency(),
            poll_interval: Duration::from_millis(default_poll_interval_ms()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FetcherConfig {
    pub timeout: Duration,
    pub max_header_bytes: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(default_fetch_timeout_secs()),
            max_header_bytes: default_max_header_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_keys() {
        let vars = vec![
            ("DATABASE_URL".to_string(), "postgres://localhost/visits".to_string()),
            ("REDIS_URL".to_string(), "redis://localhost".to_string()),
        ];
        let config: AppConfig = envy::from_iter(vars).unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.queue_name, "jobs_schedule");
        assert_eq!(config.worker_concurrency, 10);
        assert_eq!(config.consumer().poll_interval, Duration::from_millis(1000));
        assert_eq!(config.processor().store_concurrency, 16);
        assert_eq!(config.fetcher().max_header_bytes, 4 * 1024 * 1024);
    }

    #[test]
    fn zero_worker_concurrency_still_admits_one_job() {
        let vars = vec![
            ("DATABASE_URL".to_string(), "postgres://localhost/visits".to_string()),
            ("REDIS_URL".to_string(), "redis://localhost".to_string()),
            ("WORKER_CONCURRENCY".to_string(), "0".to_string()),
        ];
        let config: AppConfig = envy::from_iter(vars).unwrap();
        assert_eq!(config.consumer().concurrency, 1);
    }

    #[test]
    fn default_consumer_name_is_flagged() {
        let base = vec![
            ("DATABASE_URL".to_string(), "postgres://localhost/visits".to_string()),
            ("REDIS_URL".to_string(), "redis://localhost".to_string()),
        ];
        let config: AppConfig = envy::from_iter(base.clone()).unwrap();
        assert_eq!(config.consumer_name, DEFAULT_CONSUMER_NAME);
        assert!(config.uses_default_consumer_name());

        let mut named = base;
        named.push(("CONSUMER_NAME".to_string(), "image-processor-2".to_string()));
        let config: AppConfig = envy::from_iter(named).unwrap();
        assert!(!config.uses_default_consumer_name());
    }
}
