use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;

use super::{queries, JobStore, StoreError};
use crate::models::job::{JobError, JobStatus};
use crate::models::store::{Store, StoreVisit, VisitFilter};

/// PostgreSQL-backed [`JobStore`].
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn upsert_status(&self, job_id: i64, status: JobStatus) -> Result<(), StoreError> {
        queries::upsert_job_status(&self.pool, job_id, status).await?;
        Ok(())
    }

    async fn insert_errors(&self, rows: &[JobError]) -> Result<(), StoreError> {
        queries::insert_job_errors(&self.pool, rows).await?;
        Ok(())
    }

    async fn insert_visits(&self, rows: &[StoreVisit]) -> Result<(), StoreError> {
        queries::insert_store_visits(&self.pool, rows).await?;
        Ok(())
    }

    async fn get_status(&self, job_id: i64) -> Result<JobStatus, StoreError> {
        let raw = queries::get_job_status(&self.pool, job_id)
            .await?
            .ok_or(StoreError::NotFound(job_id))?;
        raw.parse().map_err(|_| StoreError::InvalidStatus(raw))
    }

    async fn get_errors(&self, job_id: i64) -> Result<Vec<JobError>, StoreError> {
        if queries::get_job_status(&self.pool, job_id).await?.is_none() {
            return Err(StoreError::NotFound(job_id));
        }
        Ok(queries::get_job_errors(&self.pool, job_id).await?)
    }

    async fn get_store_area(&self, store_id: &str) -> Result<Option<String>, StoreError> {
        let store = queries::get_store(&self.pool, store_id).await?;
        Ok(store.map(|s| s.store_area).filter(|area| !area.is_empty()))
    }

    async fn get_store(&self, store_id: &str) -> Result<Option<Store>, StoreError> {
        Ok(queries::get_store(&self.pool, store_id).await?)
    }

    async fn query_visits(&self, filter: &VisitFilter) -> Result<Vec<StoreVisit>, StoreError> {
        Ok(queries::query_store_visits(&self.pool, filter).await?)
    }

    async fn insert_stores(&self, rows: &[Store]) -> Result<(), StoreError> {
        // One statement cannot upsert the same key twice; the last row wins.
        let mut latest: HashMap<&str, usize> = HashMap::with_capacity(rows.len());
        for (idx, row) in rows.iter().enumerate() {
            latest.insert(row.store_id.as_str(), idx);
        }
        let deduped: Vec<Store> = rows
            .iter()
            .enumerate()
            .filter(|(idx, row)| latest.get(row.store_id.as_str()) == Some(idx))
            .map(|(_, row)| row.clone())
            .collect();

        queries::upsert_stores(&self.pool, &deduped).await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
