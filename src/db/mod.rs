use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

use crate::models::job::{JobError, JobStatus};
use crate::models::store::{Store, StoreVisit, VisitFilter};

pub mod memory;
pub mod postgres;
pub mod queries;

pub use memory::MemoryJobStore;
pub use postgres::PgJobStore;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

/// Persistence used by job processing and the read-side API.
///
/// Every call is atomic on its own; nothing spans a whole job.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert the status row for `job_id`, or overwrite it.
    async fn upsert_status(&self, job_id: i64, status: JobStatus) -> Result<(), StoreError>;

    /// Append error rows. All rows are written or none are.
    async fn insert_errors(&self, rows: &[JobError]) -> Result<(), StoreError>;

    /// Append visit rows. All rows are written or none are.
    async fn insert_visits(&self, rows: &[StoreVisit]) -> Result<(), StoreError>;

    async fn get_status(&self, job_id: i64) -> Result<JobStatus, StoreError>;

    /// Error rows for a known job; empty if the job had none.
    /// `NotFound` only when the job id has no status row.
    async fn get_errors(&self, job_id: i64) -> Result<Vec<JobError>, StoreError>;

    /// Area of a store, `None` when the store is unknown.
    async fn get_store_area(&self, store_id: &str) -> Result<Option<String>, StoreError>;

    async fn get_store(&self, store_id: &str) -> Result<Option<Store>, StoreError>;

    /// Visits matching `filter`, in no particular order.
    async fn query_visits(&self, filter: &VisitFilter) -> Result<Vec<StoreVisit>, StoreError>;

    /// Insert store metadata, replacing rows with the same store id.
    async fn insert_stores(&self, rows: &[Store]) -> Result<(), StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Job {0} not found")]
    NotFound(i64),

    #[error("Unknown job status '{0}' in database")]
    InvalidStatus(String),
}
