use crm_ledger::config::Config;
use crm_ledger::db;
use crm_ledger::directory::EntityDirectory;
use crm_ledger::ledger::LedgerService;
use crm_ledger::metrics::MetricStore;
use sqlx::SqlitePool;

pub struct TestCtx {
    pub pool: SqlitePool,
    pub directory: EntityDirectory,
    pub ledger: LedgerService,
    pub metrics: MetricStore,
}

pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_url: "sqlite::memory:".to_string(),
        max_db_connections: 1,
        bank_seed_amount: 1000,
        max_retry_attempts: 3,
        retry_backoff_ms: 10,
        rollover_retry_seconds: 1,
    }
}

pub async fn setup() -> TestCtx {
    let pool = db::connect_in_memory().await.expect("in-memory pool");
    db::migrate(&pool).await.expect("migrations");

    let config = test_config();
    let directory = EntityDirectory::new(pool.clone());
    let ledger = LedgerService::new(pool.clone(), directory.clone(), &config);
    let metrics = MetricStore::new(pool.clone(), directory.clone());

    TestCtx {
        pool,
        directory,
        ledger,
        metrics,
    }
}
