use axum::extract::State;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Describe the series this service records so scrapes carry help text.
pub fn describe_metrics() {
    metrics::describe_counter!("jobs_submitted_total", "Jobs accepted by the submit API");
    metrics::describe_counter!("jobs_received_total", "Job messages pulled from the queue");
    metrics::describe_counter!(
        "jobs_decode_failed_total",
        "Job messages that could not be decoded"
    );
    metrics::describe_counter!(
        "jobs_completed_total",
        "Jobs finished with every store analysed"
    );
    metrics::describe_counter!(
        "jobs_failed_total",
        "Jobs finished with at least one failed store"
    );
    metrics::describe_counter!(
        "jobs_unacked_total",
        "Job messages left unacknowledged after a failure"
    );
    metrics::describe_counter!(
        "image_fetch_failed_total",
        "Image fetches that failed inside a failed store"
    );
    metrics::describe_gauge!("jobs_in_flight", "Jobs currently being processed");
    metrics::describe_histogram!(
        "job_processing_seconds",
        "Time from dequeue to final status for a job"
    );
}

/// GET /metrics: Prometheus text exposition.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> String {
    handle.render()
}
