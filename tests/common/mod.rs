//! Shared fixtures: generated images, a local image server and a store that
//! can be told to fail.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::http::header;
use axum::routing::get;
use axum::Router;
use chrono::{TimeZone, Utc};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use store_visit_processor::db::{JobStore, MemoryJobStore, StoreError};
use store_visit_processor::models::job::{JobError, JobStatus, JobSubmission, StoreVisitRequest};
use store_visit_processor::models::store::{Store, StoreVisit, VisitFilter};

pub fn encode_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::new(width, height));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}

/// Serves `/ok/a.png` (100x50), `/ok/b.jpg` (40x30), `/ok/big.png`
/// (1200x800), `/text` (HTML); anything else is a 404.
pub async fn spawn_image_server() -> String {
    let png = encode_image(100, 50, ImageFormat::Png);
    let jpg = encode_image(40, 30, ImageFormat::Jpeg);
    let big = encode_image(1200, 800, ImageFormat::Png);

    let app = Router::new()
        .route(
            "/ok/a.png",
            get(move || {
                let body = png.clone();
                async move { ([(header::CONTENT_TYPE, "image/png")], body) }
            }),
        )
        .route(
            "/ok/b.jpg",
            get(move || {
                let body = jpg.clone();
                // Wrong content type on purpose: format comes from the bytes.
                async move { ([(header::CONTENT_TYPE, "text/plain")], body) }
            }),
        )
        .route(
            "/ok/big.png",
            get(move || {
                let body = big.clone();
                async move { ([(header::CONTENT_TYPE, "image/png")], body) }
            }),
        )
        .route(
            "/text",
            get(|| async { "<html><body>this page is not an image</body></html>" }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

pub fn store_request(store_id: &str, urls: Vec<String>) -> StoreVisitRequest {
    StoreVisitRequest {
        store_id: store_id.to_string(),
        visit_time: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
        image_urls: urls,
    }
}

pub fn job(job_id: i64, stores: Vec<StoreVisitRequest>) -> JobSubmission {
    JobSubmission {
        job_id,
        store_jobs: stores,
    }
}

/// Memory store whose writes and store lookups can be switched to fail.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryJobStore,
    pub fail_errors: AtomicBool,
    pub fail_visits: AtomicBool,
    pub fail_lookup: AtomicBool,
    pub fail_status: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_fail_errors(&self, fail: bool) {
        self.fail_errors.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_visits(&self, fail: bool) {
        self.fail_visits.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_lookup(&self, fail: bool) {
        self.fail_lookup.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_status(&self, fail: bool) {
        self.fail_status.store(fail, Ordering::SeqCst);
    }
}

fn injected() -> StoreError {
    StoreError::Database(sqlx::Error::PoolTimedOut)
}

#[async_trait]
impl JobStore for FlakyStore {
    async fn upsert_status(&self, job_id: i64, status: JobStatus) -> Result<(), StoreError> {
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.upsert_status(job_id, status).await
    }

    async fn insert_errors(&self, rows: &[JobError]) -> Result<(), StoreError> {
        if self.fail_errors.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.insert_errors(rows).await
    }

    async fn insert_visits(&self, rows: &[StoreVisit]) -> Result<(), StoreError> {
        if self.fail_visits.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.insert_visits(rows).await
    }

    async fn get_status(&self, job_id: i64) -> Result<JobStatus, StoreError> {
        self.inner.get_status(job_id).await
    }

    async fn get_errors(&self, job_id: i64) -> Result<Vec<JobError>, StoreError> {
        self.inner.get_errors(job_id).await
    }

    async fn get_store_area(&self, store_id: &str) -> Result<Option<String>, StoreError> {
        if self.fail_lookup.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.get_store_area(store_id).await
    }

    async fn get_store(&self, store_id: &str) -> Result<Option<Store>, StoreError> {
        self.inner.get_store(store_id).await
    }

    async fn query_visits(&self, filter: &VisitFilter) -> Result<Vec<StoreVisit>, StoreError> {
        self.inner.query_visits(filter).await
    }

    async fn insert_stores(&self, rows: &[Store]) -> Result<(), StoreError> {
        self.inner.insert_stores(rows).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.inner.health_check().await
    }
}
