use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use crate::models::job::{JobError, JobStatus};
use crate::models::store::{Store, StoreVisit, VisitFilter};

/// Rows per INSERT statement; keeps bind counts well under Postgres' limit.
const INSERT_CHUNK: usize = 1000;

/// Insert or overwrite the status row for a job
pub async fn upsert_job_status(
    pool: &PgPool,
    job_id: i64,
    status: JobStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO job_status (job_id, status)
        VALUES ($1, $2)
        ON CONFLICT (job_id)
        DO UPDATE SET status = EXCLUDED.status, updated_at = NOW()
        "#,
    )
    .bind(job_id)
    .bind(status.as_ref())
    .execute(pool)
    .await?;

    Ok(())
}

/// Get the raw status string for a job
pub async fn get_job_status(pool: &PgPool, job_id: i64) -> Result<Option<String>, sqlx::Error> {
    let row = sqlx::query("SELECT status FROM job_status WHERE job_id = $1")
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    row.map(|r| r.try_get("status")).transpose()
}

/// Bulk insert per-store job errors in one transaction
pub async fn insert_job_errors(pool: &PgPool, rows: &[JobError]) -> Result<(), sqlx::Error> {
    if rows.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for chunk in rows.chunks(INSERT_CHUNK) {
        let mut builder =
            QueryBuilder::<Postgres>::new("INSERT INTO job_errors (job_id, store_id, error) ");
        builder.push_values(chunk, |mut b, row| {
            b.push_bind(row.job_id)
                .push_bind(row.store_id.clone())
                .push_bind(row.error.clone());
        });
        builder.build().execute(&mut *tx).await?;
    }
    tx.commit().await
}

/// Get all error rows recorded for a job
pub async fn get_job_errors(pool: &PgPool, job_id: i64) -> Result<Vec<JobError>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT job_id, store_id, error
        FROM job_errors
        WHERE job_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| {
            Ok(JobError {
                job_id: r.try_get("job_id")?,
                store_id: r.try_get("store_id")?,
                error: r.try_get("error")?,
            })
        })
        .collect()
}

/// Bulk insert store visits in one transaction
pub async fn insert_store_visits(pool: &PgPool, rows: &[StoreVisit]) -> Result<(), sqlx::Error> {
    if rows.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for chunk in rows.chunks(INSERT_CHUNK) {
        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO store_visits (store_id, store_area, perimeter, visit_time) ",
        );
        builder.push_values(chunk, |mut b, row| {
            b.push_bind(row.store_id.clone())
                .push_bind(row.store_area.clone())
                .push_bind(row.perimeter)
                .push_bind(row.visit_time);
        });
        builder.build().execute(&mut *tx).await?;
    }
    tx.commit().await
}

/// Query visits; every filter field that is set narrows the result
pub async fn query_store_visits(
    pool: &PgPool,
    filter: &VisitFilter,
) -> Result<Vec<StoreVisit>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "SELECT store_id, store_area, perimeter, visit_time FROM store_visits WHERE TRUE",
    );
    if let Some(store_id) = &filter.store_id {
        builder.push(" AND store_id = ").push_bind(store_id.clone());
    }
    if let Some(area) = &filter.area {
        builder.push(" AND store_area = ").push_bind(area.clone());
    }
    if let Some(start) = filter.start {
        builder.push(" AND visit_time >= ").push_bind(start);
    }
    if let Some(end) = filter.end {
        builder.push(" AND visit_time <= ").push_bind(end);
    }

    let rows = builder.build().fetch_all(pool).await?;

    rows.into_iter()
        .map(|r| {
            Ok(StoreVisit {
                store_id: r.try_get("store_id")?,
                store_area: r.try_get("store_area")?,
                perimeter: r.try_get("perimeter")?,
                visit_time: r.try_get("visit_time")?,
            })
        })
        .collect()
}

/// Look up store metadata by store id
pub async fn get_store(pool: &PgPool, store_id: &str) -> Result<Option<Store>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT store_id, store_area, store_name
        FROM stores
        WHERE store_id = $1
        "#,
    )
    .bind(store_id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| {
        Ok(Store {
            store_id: r.try_get("store_id")?,
            store_area: r.try_get("store_area")?,
            store_name: r.try_get("store_name")?,
        })
    })
    .transpose()
}

/// Bulk upsert store metadata keyed by store id
pub async fn upsert_stores(pool: &PgPool, rows: &[Store]) -> Result<(), sqlx::Error> {
    if rows.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for chunk in rows.chunks(INSERT_CHUNK) {
        let mut builder =
            QueryBuilder::<Postgres>::new("INSERT INTO stores (store_id, store_area, store_name) ");
        builder.push_values(chunk, |mut b, row| {
            b.push_bind(row.store_id.clone())
                .push_bind(row.store_area.clone())
                .push_bind(row.store_name.clone());
        });
        builder.push(
            " ON CONFLICT (store_id) DO UPDATE SET store_area = EXCLUDED.store_area, store_name = EXCLUDED.store_name",
        );
        builder.build().execute(&mut *tx).await?;
    }
    tx.commit().await
}
