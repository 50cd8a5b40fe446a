use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_db_connections: u32,
    // seed balance (whole currency units) for a lazily created bank week
    pub bank_seed_amount: i64,
    pub max_retry_attempts: u32,
    pub retry_backoff_ms: u64,
    // how long the reset scheduler waits before retrying a failed rollover pass
    pub rollover_retry_seconds: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // treating empty DATABASE_URL as unset because docker-compose was setting it to ""
        let database_url = env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "sqlite:crm_ledger.db".to_string());

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()?,
            database_url,
            max_db_connections: env::var("MAX_DB_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            bank_seed_amount: env::var("BANK_SEED_AMOUNT")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            max_retry_attempts: env::var("MAX_RETRY_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            retry_backoff_ms: env::var("RETRY_BACKOFF_MS")
                .unwrap_or_else(|_| "50".to_string())
                .parse()?,
            rollover_retry_seconds: env::var("ROLLOVER_RETRY_SECONDS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()?,
        })
    }
}
