use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

use crate::config::ProcessorConfig;
use crate::db::{JobStore, StoreError};
use crate::models::job::{JobError, JobStatus, JobSubmission, StoreVisitRequest};
use crate::models::store::StoreVisit;
use crate::services::image_fetcher::{FetchError, ImageFetcher};

/// What one processing attempt wrote.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: i64,
    pub status: JobStatus,
    pub errors: Vec<JobError>,
    pub visits: Vec<StoreVisit>,
}

#[derive(Debug, Clone)]
enum StoreOutcome {
    Visit(StoreVisit),
    Failed(JobError),
}

/// Fans a job out over its stores and images and records the results.
pub struct JobProcessor {
    store: Arc<dyn JobStore>,
    fetcher: Arc<dyn ImageFetcher>,
    config: ProcessorConfig,
}

impl JobProcessor {
    pub fn new(
        store: Arc<dyn JobStore>,
        fetcher: Arc<dyn ImageFetcher>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            config,
        }
    }

    /// Process one job end to end.
    ///
    /// Image failures are recorded per store and never abort the job. A
    /// persistence failure aborts immediately; rows already written stay.
    pub async fn process(&self, job: JobSubmission) -> Result<JobReport, ProcessingError> {
        let job_id = job.job_id;

        self.store.upsert_status(job_id, JobStatus::Running).await?;

        tracing::info!(
            job_id,
            stores = job.store_jobs.len(),
            images = job.image_count(),
            "Processing store visit job"
        );

        let outcomes = self.run_stores(job_id, job.store_jobs).await?;

        let mut errors = Vec::new();
        let mut visits = Vec::new();
        for outcome in outcomes {
            match outcome {
                StoreOutcome::Visit(visit) => visits.push(visit),
                StoreOutcome::Failed(error) => errors.push(error),
            }
        }

        let status = if errors.is_empty() {
            JobStatus::Completed
        } else {
            self.store.insert_errors(&errors).await?;
            JobStatus::Failed
        };
        self.store.upsert_status(job_id, status).await?;

        if !visits.is_empty() {
            self.store.insert_visits(&visits).await?;
        }

        tracing::info!(
            job_id,
            status = %status,
            failed_stores = errors.len(),
            visits = visits.len(),
            "Job finished"
        );

        Ok(JobReport {
            job_id,
            status,
            errors,
            visits,
        })
    }

    /// Runs every store concurrently; results come back in request order.
    ///
    /// Returning early drops the task set, which aborts sibling stores and
    /// their fetches.
    async fn run_stores(
        &self,
        job_id: i64,
        requests: Vec<StoreVisitRequest>,
    ) -> Result<Vec<StoreOutcome>, ProcessingError> {
        let limit = limiter(self.config.store_concurrency);
        let image_concurrency = self.config.image_concurrency;

        let mut slots: Vec<Option<StoreOutcome>> = vec![None; requests.len()];
        let mut tasks = JoinSet::new();
        for (idx, request) in requests.into_iter().enumerate() {
            let store = Arc::clone(&self.store);
            let fetcher = Arc::clone(&self.fetcher);
            let limit = limit.clone();
            tasks.spawn(async move {
                let _permit = acquire(limit).await;
                let outcome = process_store(job_id, request, store, fetcher, image_concurrency).await;
                (idx, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (idx, outcome) = joined.map_err(|e| ProcessingError::Aborted(e.to_string()))?;
            slots[idx] = Some(outcome?);
        }

        Ok(slots.into_iter().flatten().collect())
    }
}

async fn process_store(
    job_id: i64,
    request: StoreVisitRequest,
    store: Arc<dyn JobStore>,
    fetcher: Arc<dyn ImageFetcher>,
    image_concurrency: usize,
) -> Result<StoreOutcome, StoreError> {
    let fetched = fetch_all(fetcher, &request.image_urls, image_concurrency).await;

    let failures = fetched.iter().filter(|r| r.is_err()).count();
    // Lowest-index failure represents the store.
    if let Some((idx, err)) = fetched
        .iter()
        .enumerate()
        .find_map(|(idx, r)| r.as_ref().err().map(|e| (idx, e)))
    {
        metrics::counter!("image_fetch_failed_total").increment(failures as u64);
        tracing::warn!(
            job_id,
            store_id = %request.store_id,
            url = %request.image_urls[idx],
            failed_images = failures,
            error = %err,
            "Store failed"
        );
        return Ok(StoreOutcome::Failed(JobError {
            job_id,
            store_id: request.store_id,
            error: err.to_string(),
        }));
    }

    let total: u64 = fetched.iter().filter_map(|r| r.as_ref().ok()).sum();
    let store_area = store
        .get_store_area(&request.store_id)
        .await?
        .unwrap_or_default();

    tracing::debug!(
        job_id,
        store_id = %request.store_id,
        perimeter = total,
        "Store analysed"
    );

    Ok(StoreOutcome::Visit(StoreVisit {
        store_id: request.store_id,
        store_area,
        perimeter: i64::try_from(total).unwrap_or(i64::MAX),
        visit_time: request.visit_time,
    }))
}

/// Fetches every URL concurrently; the result at `i` belongs to `urls[i]`.
async fn fetch_all(
    fetcher: Arc<dyn ImageFetcher>,
    urls: &[String],
    concurrency: usize,
) -> Vec<Result<u64, FetchError>> {
    let limit = limiter(concurrency);

    let mut tasks = JoinSet::new();
    for (idx, url) in urls.iter().cloned().enumerate() {
        let fetcher = Arc::clone(&fetcher);
        let limit = limit.clone();
        tasks.spawn(async move {
            let _permit = acquire(limit).await;
            tracing::trace!(url = %url, "Fetching image header");
            (idx, fetcher.fetch(&url).await)
        });
    }

    let mut slots: Vec<Option<Result<u64, FetchError>>> = urls.iter().map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((idx, result)) => slots[idx] = Some(result),
            Err(e) => tracing::error!(error = %e, "Image fetch task failed"),
        }
    }

    slots
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| Err(FetchError::Aborted("fetch task did not complete".to_string())))
        })
        .collect()
}

/// `None` means unbounded.
fn limiter(concurrency: usize) -> Option<Arc<Semaphore>> {
    (concurrency > 0).then(|| Arc::new(Semaphore::new(concurrency)))
}

async fn acquire(limit: Option<Arc<Semaphore>>) -> Option<OwnedSemaphorePermit> {
    match limit {
        Some(semaphore) => semaphore.acquire_owned().await.ok(),
        None => None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("Store task aborted: {0}")]
    Aborted(String),
}
