//! Day-rollover maintenance: a long-lived reset scheduler that fires once per
//! local midnight, and a bootstrap reconciler that runs the same pass once at
//! startup to cover restarts that straddled midnight.

use std::time::Duration;

use chrono::{Local, NaiveDate};
use tokio::sync::watch;

use crate::config::Config;
use crate::db::models::MetricKind;
use crate::directory::EntityDirectory;
use crate::error::Result;
use crate::metrics::MetricStore;
use crate::period;

#[derive(Debug, Default)]
pub struct RolloverStats {
    pub entities: usize,
    pub created: usize,
    pub failed: usize,
}

pub struct ResetScheduler {
    metrics: MetricStore,
    directory: EntityDirectory,
    retry_interval: Duration,
}

impl ResetScheduler {
    pub fn new(metrics: MetricStore, directory: EntityDirectory, config: &Config) -> Self {
        Self {
            metrics,
            directory,
            retry_interval: Duration::from_secs(config.rollover_retry_seconds),
        }
    }

    /// Loop forever: sleep until the next local midnight, then roll every
    /// tracked entity over to the new day. The fire time is recomputed from
    /// wall-clock rules on each iteration, so the cadence cannot drift. A
    /// failed pass is retried after a short interval instead of skipping the
    /// day; rollover is idempotent, so retries are safe.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Reset scheduler started");

        loop {
            let delay = period::until_next_midnight(Local::now().naive_local());
            tracing::info!("Next counter reset in {:?}", delay);

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            loop {
                let today = Local::now().date_naive();
                match run_rollover_pass(&self.metrics, &self.directory, today).await {
                    Ok(stats) => {
                        tracing::info!(
                            "Rollover pass for {} complete: {} entities, {} created, {} failed",
                            today,
                            stats.entities,
                            stats.created,
                            stats.failed
                        );
                        break;
                    }
                    Err(e) => {
                        tracing::error!(
                            "Rollover pass for {} failed, retrying in {:?}: {}",
                            today,
                            self.retry_interval,
                            e
                        );
                        tokio::select! {
                            _ = shutdown.changed() => return,
                            _ = tokio::time::sleep(self.retry_interval) => {}
                        }
                    }
                }
            }
        }

        tracing::info!("Reset scheduler stopped");
    }
}

/// Ensure today's metric records exist for every tracked entity, zeroing each
/// entity's today-counter when its new day is materialized. Entities whose
/// records already exist are left untouched, which makes the pass idempotent.
/// A failure on one entity is logged and never aborts the pass for the rest.
pub async fn run_rollover_pass(
    metrics: &MetricStore,
    directory: &EntityDirectory,
    today: NaiveDate,
) -> Result<RolloverStats> {
    let entities = directory.find_all().await?;

    let mut stats = RolloverStats {
        entities: entities.len(),
        ..RolloverStats::default()
    };

    for entity in &entities {
        match rollover_entity(metrics, directory, &entity.id, today).await {
            Ok(true) => stats.created += 1,
            Ok(false) => {}
            Err(e) => {
                stats.failed += 1;
                tracing::warn!("Rollover failed for entity {}: {}", entity.id, e);
            }
        }
    }

    Ok(stats)
}

async fn rollover_entity(
    metrics: &MetricStore,
    directory: &EntityDirectory,
    entity_id: &str,
    today: NaiveDate,
) -> Result<bool> {
    let mut missing = 0;

    for kind in MetricKind::ALL {
        if metrics.find_record(entity_id, kind, today).await?.is_none() {
            metrics.ensure_record(entity_id, kind, today).await?;
            missing += 1;
        }
    }

    // only reset the display counter when the whole day was missing: any
    // existing record means an earlier pass or a live contribution already
    // touched today, and the counter may hold counts accrued since then
    if missing == MetricKind::ALL.len() {
        directory.reset_today_counter(entity_id).await?;
    }

    Ok(missing > 0)
}

/// Run one rollover pass for today before the process starts serving. Covers
/// the case where the process was down when the scheduler should have fired.
pub async fn bootstrap_reconcile(
    metrics: &MetricStore,
    directory: &EntityDirectory,
) -> Result<RolloverStats> {
    let today = Local::now().date_naive();
    tracing::info!("Bootstrap reconciler running for {}", today);
    run_rollover_pass(metrics, directory, today).await
}
