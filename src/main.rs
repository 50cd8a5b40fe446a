use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use dotenvy as dotenv;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crm_ledger::config::Config;
use crm_ledger::directory::EntityDirectory;
use crm_ledger::ledger::LedgerService;
use crm_ledger::metrics::MetricStore;
use crm_ledger::scheduler::{self, ResetScheduler};
use crm_ledger::{api, db, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // trying multiple .env locations since working directory differs between dev and prod
    let _ = dotenv::from_filename_override(".env");
    let _ = dotenv::from_filename_override(concat!(env!("CARGO_MANIFEST_DIR"), "/.env"));
    let _ = dotenv::dotenv_override();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,crm_ledger=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting CRM ledger core");

    let config = Config::from_env().context("error with configuration")?;
    tracing::info!("Configuration loaded successfully");

    tracing::info!("Connecting to database...");
    let pool = db::connect(&config.database_url, config.max_db_connections)
        .await
        .context("Failed to connect to database")?;
    db::migrate(&pool).await.context("Failed to run migrations")?;
    tracing::info!("Database ready");

    let directory = EntityDirectory::new(pool.clone());
    let ledger = LedgerService::new(pool.clone(), directory.clone(), &config);
    let metrics = MetricStore::new(pool.clone(), directory.clone());

    // reconcile before serving: if the process was down across midnight the
    // scheduler never fired, so today's records may be missing
    let stats = scheduler::bootstrap_reconcile(&metrics, &directory)
        .await
        .context("Bootstrap reconciliation failed")?;
    tracing::info!(
        "Bootstrap reconciled {} entities ({} rolled over, {} failed)",
        stats.entities,
        stats.created,
        stats.failed
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let reset_scheduler = ResetScheduler::new(metrics.clone(), directory.clone(), &config);
    tokio::spawn(reset_scheduler.run(shutdown_rx));

    let app_state = Arc::new(AppState { ledger, metrics });

    let app = Router::new()
        .route("/health", get(api::health::health_check))
        .route("/bank", get(api::ledger::get_current_bank))
        .route("/bank/withdraw", post(api::ledger::withdraw))
        .route("/bank/balance", post(api::ledger::set_balance))
        .route("/bank/transactions", get(api::ledger::list_transactions))
        .route("/bank/report/:bank_id", get(api::ledger::weekly_report))
        .route("/metrics/contribution", post(api::metrics::record_contribution))
        .route("/metrics/today/:entity_id", get(api::metrics::get_today))
        .route("/metrics/hourly/:entity_id", get(api::metrics::hourly_breakdown))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    // in case the configured port is taken, try a few more before giving up
    let mut port = config.port;
    let mut listener = None;

    for _ in 0..10u16 {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(l) => {
                listener = Some((addr, l));
                break;
            }
            Err(e) => {
                tracing::warn!("Failed to bind to {}: {} (trying next port)", addr, e);
                port = port.saturating_add(1);
            }
        }
    }

    let (addr, listener) = listener.ok_or_else(|| {
        anyhow::anyhow!(
            "Failed to bind to any port in range {}..{}",
            config.port,
            config.port.saturating_add(9)
        )
    })?;

    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    Ok(())
}
