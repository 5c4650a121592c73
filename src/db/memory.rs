use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{JobStore, StoreError};
use crate::models::job::{JobError, JobStatus};
use crate::models::store::{Store, StoreVisit, VisitFilter};

/// In-process [`JobStore`] for tests and local runs.
#[derive(Default)]
pub struct MemoryJobStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    statuses: HashMap<i64, JobStatus>,
    status_writes: Vec<(i64, JobStatus)>,
    errors: Vec<JobError>,
    visits: Vec<StoreVisit>,
    stores: HashMap<String, Store>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stores(stores: impl IntoIterator<Item = Store>) -> Self {
        let store = Self::default();
        {
            let mut state = store.lock();
            for s in stores {
                state.stores.insert(s.store_id.clone(), s);
            }
        }
        store
    }

    /// Every status written for `job_id`, oldest first.
    pub fn status_history(&self, job_id: i64) -> Vec<JobStatus> {
        self.lock()
            .status_writes
            .iter()
            .filter(|(id, _)| *id == job_id)
            .map(|(_, status)| *status)
            .collect()
    }

    /// All visit rows in insertion order.
    pub fn visits(&self) -> Vec<StoreVisit> {
        self.lock().visits.clone()
    }

    /// All error rows in insertion order.
    pub fn errors(&self) -> Vec<JobError> {
        self.lock().errors.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panicking writer cannot leave a half-applied row behind; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn upsert_status(&self, job_id: i64, status: JobStatus) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.statuses.insert(job_id, status);
        state.status_writes.push((job_id, status));
        Ok(())
    }

    async fn insert_errors(&self, rows: &[JobError]) -> Result<(), StoreError> {
        self.lock().errors.extend_from_slice(rows);
        Ok(())
    }

    async fn insert_visits(&self, rows: &[StoreVisit]) -> Result<(), StoreError> {
        self.lock().visits.extend_from_slice(rows);
        Ok(())
    }

    async fn get_status(&self, job_id: i64) -> Result<JobStatus, StoreError> {
        self.lock()
            .statuses
            .get(&job_id)
            .copied()
            .ok_or(StoreError::NotFound(job_id))
    }

    async fn get_errors(&self, job_id: i64) -> Result<Vec<JobError>, StoreError> {
        let state = self.lock();
        if !state.statuses.contains_key(&job_id) {
            return Err(StoreError::NotFound(job_id));
        }
        Ok(state
            .errors
            .iter()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn get_store_area(&self, store_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .lock()
            .stores
            .get(store_id)
            .map(|s| s.store_area.clone())
            .filter(|area| !area.is_empty()))
    }

    async fn get_store(&self, store_id: &str) -> Result<Option<Store>, StoreError> {
        Ok(self.lock().stores.get(store_id).cloned())
    }

    async fn query_visits(&self, filter: &VisitFilter) -> Result<Vec<StoreVisit>, StoreError> {
        Ok(self
            .lock()
            .visits
            .iter()
            .filter(|v| filter.matches(v))
            .cloned()
            .collect())
    }

    async fn insert_stores(&self, rows: &[Store]) -> Result<(), StoreError> {
        let mut state = self.lock();
        for row in rows {
            state.stores.insert(row.store_id.clone(), row.clone());
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn visit(store_id: &str, area: &str, day: u32) -> StoreVisit {
        StoreVisit {
            store_id: store_id.to_string(),
            store_area: area.to_string(),
            perimeter: 300,
            visit_time: Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_status_upsert_last_write_wins() {
        let store = MemoryJobStore::new();
        store.upsert_status(7, JobStatus::Created).await.unwrap();
        store.upsert_status(7, JobStatus::Running).await.unwrap();
        store.upsert_status(7, JobStatus::Created).await.unwrap();

        assert_eq!(store.get_status(7).await.unwrap(), JobStatus::Created);
        assert_eq!(store.status_history(7).len(), 3);
    }

    #[tokio::test]
    async fn test_get_errors_distinguishes_unknown_job() {
        let store = MemoryJobStore::new();
        assert!(matches!(store.get_errors(1).await, Err(StoreError::NotFound(1))));

        store.upsert_status(1, JobStatus::Completed).await.unwrap();
        assert!(store.get_errors(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_store_area_is_none() {
        let store = MemoryJobStore::with_stores([Store {
            store_id: "S1".into(),
            store_area: "7100".into(),
            store_name: "Corner Mart".into(),
        }]);
        assert_eq!(store.get_store_area("S1").await.unwrap().as_deref(), Some("7100"));
        assert_eq!(store.get_store_area("S9").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_query_visits_filters_combine() {
        let store = MemoryJobStore::new();
        store
            .insert_visits(&[visit("S1", "7100", 1), visit("S1", "7100", 10), visit("S2", "7200", 5)])
            .await
            .unwrap();

        let by_store = VisitFilter {
            store_id: Some("S1".into()),
            ..Default::default()
        };
        assert_eq!(store.query_visits(&by_store).await.unwrap().len(), 2);

        let windowed = VisitFilter {
            start: Some(Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap()),
            end: Some(Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap()),
            ..Default::default()
        };
        let hits = store.query_visits(&windowed).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].store_id, "S2");
    }
}
