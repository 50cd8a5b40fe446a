pub mod api;
pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod period;
pub mod scheduler;

use ledger::LedgerService;
use metrics::MetricStore;

#[derive(Clone)]
pub struct AppState {
    pub ledger: LedgerService,
    pub metrics: MetricStore,
}
