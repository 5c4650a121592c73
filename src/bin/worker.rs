use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use store_visit_processor::{
    config::AppConfig,
    db::{self, PgJobStore},
    routes::metrics::describe_metrics,
    services::{
        consumer::QueueConsumer, image_fetcher::HttpImageFetcher, processor::JobProcessor,
        queue::RedisQueue,
    },
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting store visit worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    let metrics_addr: SocketAddr = config
        .worker_metrics_addr
        .parse()
        .expect("WORKER_METRICS_ADDR must be a socket address");
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .expect("Failed to install Prometheus exporter");
    describe_metrics();

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize services
    if config.uses_default_consumer_name() {
        tracing::warn!(
            consumer = %config.consumer_name,
            "CONSUMER_NAME not set; run only one worker with this name or set a unique one per replica"
        );
    }
    tracing::info!(queue = %config.queue_name, consumer = %config.consumer_name, "Connecting to Redis job queue");
    let queue = RedisQueue::new(&config.redis_url, &config.queue_name, &config.consumer_name)
        .expect("Failed to initialize job queue");

    // Anything left in our processing list was never acknowledged.
    match queue.recover_unacked().await {
        Ok(0) => {}
        Ok(n) => tracing::warn!(recovered = n, "Requeued unacknowledged messages from a previous run"),
        Err(e) => tracing::error!(error = %e, "Failed to requeue unacknowledged messages"),
    }

    let fetcher = HttpImageFetcher::new(config.fetcher()).expect("Failed to build HTTP client");

    let processor = JobProcessor::new(
        Arc::new(PgJobStore::new(db_pool)),
        Arc::new(fetcher),
        config.processor(),
    );

    let consumer = QueueConsumer::new(Arc::new(queue), Arc::new(processor), config.consumer());

    tracing::info!(
        concurrency = config.worker_concurrency,
        store_concurrency = config.store_concurrency,
        image_concurrency = config.image_concurrency,
        "Worker ready, starting job processing loop"
    );

    consumer
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received");
        })
        .await;
}
