use std::path::{Path, PathBuf};
use store_visit_processor::{
    config::AppConfig,
    db::{self, JobStore, PgJobStore},
    models::store::Store,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_CSV: &str = "data.csv";

/// CSV columns, in order: area code, store name, store id. No header row.
#[derive(Debug, serde::Deserialize)]
struct StoreRow {
    store_area: String,
    store_name: String,
    store_id: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CSV));

    let config = AppConfig::from_env().expect("Failed to load configuration");

    let stores = match read_stores(&path) {
        Ok(stores) => stores,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to read store CSV");
            std::process::exit(1);
        }
    };

    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    let store = PgJobStore::new(db_pool);
    if let Err(e) = store.insert_stores(&stores).await {
        tracing::error!(error = %e, "Failed to import stores");
        std::process::exit(1);
    }

    tracing::info!(path = %path.display(), stores = stores.len(), "Stores imported");
}

fn read_stores(path: &Path) -> Result<Vec<Store>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_path(path)?;

    reader
        .deserialize::<StoreRow>()
        .map(|row| {
            row.map(|r| Store {
                store_id: r.store_id,
                store_area: r.store_area,
                store_name: r.store_name,
            })
        })
        .collect()
}
