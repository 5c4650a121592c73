use chrono::{TimeZone, Utc};
use rand::Rng;
use store_visit_processor::{
    config::AppConfig,
    db::{self, JobStore, PgJobStore, StoreError},
    models::job::{JobError, JobStatus, JobSubmission, StoreVisitRequest},
    models::store::{Store, StoreVisit, VisitFilter},
    services::queue::{publish_job, MessageQueue, RedisQueue},
};

/// Integration test: job store against PostgreSQL
///
/// Covers status upserts, bulk inserts, the NotFound/empty distinction for
/// errors, store metadata upserts and filtered visit queries.
///
/// Note: This requires a running PostgreSQL instance configured via
/// environment variables.
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_postgres_job_store() {
    let config = AppConfig::from_env().expect("Failed to load config");

    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run migrations");

    let store = PgJobStore::new(db_pool);
    let job_id: i64 = rand::thread_rng().gen_range(100_000_000..999_999_999);
    let store_id = format!("IT-{}", job_id);

    // 1. Unknown job
    assert!(matches!(store.get_status(job_id).await, Err(StoreError::NotFound(_))));
    assert!(matches!(store.get_errors(job_id).await, Err(StoreError::NotFound(_))));

    // 2. Upsert keeps one row, last write wins
    store.upsert_status(job_id, JobStatus::Created).await.unwrap();
    store.upsert_status(job_id, JobStatus::Running).await.unwrap();
    assert_eq!(store.get_status(job_id).await.unwrap(), JobStatus::Running);
    assert!(store.get_errors(job_id).await.unwrap().is_empty());

    // 3. Errors
    store
        .insert_errors(&[JobError {
            job_id,
            store_id: store_id.clone(),
            error: "HTTP 404 Not Found fetching https://404/x.png".to_string(),
        }])
        .await
        .unwrap();
    store.upsert_status(job_id, JobStatus::Failed).await.unwrap();
    assert_eq!(store.get_errors(job_id).await.unwrap().len(), 1);

    // 4. Store metadata, duplicate ids in one batch collapse to the last row
    store
        .insert_stores(&[
            Store {
                store_id: store_id.clone(),
                store_area: "7000".to_string(),
                store_name: "Old Name".to_string(),
            },
            Store {
                store_id: store_id.clone(),
                store_area: "7100".to_string(),
                store_name: "Corner Mart".to_string(),
            },
        ])
        .await
        .unwrap();
    assert_eq!(
        store.get_store_area(&store_id).await.unwrap().as_deref(),
        Some("7100")
    );

    // 5. Visits and filters
    let visit_time = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
    store
        .insert_visits(&[StoreVisit {
            store_id: store_id.clone(),
            store_area: "7100".to_string(),
            perimeter: 300,
            visit_time,
        }])
        .await
        .unwrap();

    let visits = store
        .query_visits(&VisitFilter {
            store_id: Some(store_id.clone()),
            start: Some(visit_time),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(visits.len(), 1);
    assert_eq!(visits[0].perimeter, 300);

    store.health_check().await.unwrap();
}

/// Integration test: Redis reliable queue
///
/// Note: This requires a running Redis instance configured via environment
/// variables.
#[tokio::test]
#[ignore]
async fn test_redis_queue_ack_and_recovery() {
    let config = AppConfig::from_env().expect("Failed to load config");
    let suffix: u32 = rand::thread_rng().gen();
    let queue = RedisQueue::new(
        &config.redis_url,
        &format!("it_jobs_{}", suffix),
        "integration",
    )
    .expect("Failed to initialize queue");

    queue.health_check().await.unwrap();

    let job = JobSubmission {
        job_id: 1,
        store_jobs: vec![StoreVisitRequest {
            store_id: "S1".to_string(),
            visit_time: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            image_urls: vec!["https://ok/a.png".to_string()],
        }],
    };
    publish_job(&queue, &job).await.unwrap();
    assert_eq!(queue.queue_depth().await.unwrap(), 1);

    // Received but never acknowledged: recovery puts it back.
    let delivery = queue.receive().await.unwrap().expect("No job in queue");
    assert_eq!(delivery.decode().unwrap(), job);
    assert_eq!(queue.queue_depth().await.unwrap(), 0);
    assert_eq!(queue.recover_unacked().await.unwrap(), 1);

    // Acknowledged: gone for good.
    let delivery = queue.receive().await.unwrap().expect("No job in queue");
    queue.ack(&delivery).await.unwrap();
    assert_eq!(queue.recover_unacked().await.unwrap(), 0);
    assert_eq!(queue.queue_depth().await.unwrap(), 0);
}
