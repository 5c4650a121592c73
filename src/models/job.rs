use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};

/// Status of a store visit job. Stored as its lowercase name.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Created,
    Running,
    Completed,
    Failed,
}

/// Message payload carried through the queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSubmission {
    #[serde(rename = "jobId")]
    pub job_id: i64,
    #[serde(default)]
    pub store_jobs: Vec<StoreVisitRequest>,
}

impl JobSubmission {
    pub fn image_count(&self) -> usize {
        self.store_jobs.iter().map(|s| s.image_urls.len()).sum()
    }
}

/// One store inside a job: when it was visited and the images taken.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct StoreVisitRequest {
    #[garde(length(min = 1, max = 64))]
    pub store_id: String,
    #[garde(skip)]
    pub visit_time: DateTime<Utc>,
    #[serde(rename = "image_url", default)]
    #[garde(inner(length(min = 1)))]
    pub image_urls: Vec<String>,
}

/// A store that failed inside a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobError {
    pub job_id: i64,
    pub store_id: String,
    pub error: String,
}
