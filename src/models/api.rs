use garde::Validate;
use serde::{Deserialize, Serialize};

use super::job::StoreVisitRequest;

/// Request body for `POST /api/submit`.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitRequest {
    #[garde(range(min = 1))]
    pub count: usize,

    #[garde(length(min = 1), dive)]
    pub visits: Vec<StoreVisitRequest>,
}

/// Response after a job has been accepted.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: i64,
}

/// Query string for `GET /api/status`.
#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(alias = "jobId")]
    pub jobid: Option<String>,
}

/// Response for querying job status.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub status: String,
    pub job_id: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error: Vec<StoreErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreErrorInfo {
    pub store_id: String,
    pub error: String,
}

/// Query string for `GET /api/visits`.
#[derive(Debug, Default, Deserialize)]
pub struct VisitsQuery {
    #[serde(alias = "storeId")]
    pub storeid: Option<String>,
    pub area: Option<String>,
    pub startdate: Option<String>,
    pub enddate: Option<String>,
}

/// Visit history for one store.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoreVisitsResponse {
    pub store_id: String,
    pub area: String,
    pub store_name: String,
    pub data: Vec<VisitData>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VisitData {
    pub date: String,
    pub perimeter: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
