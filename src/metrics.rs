//! Per-entity daily accumulators with weekly/monthly running totals and an
//! hour-of-day breakdown. Productivity counts and earnings share this shape,
//! discriminated by `MetricKind`.

use chrono::{NaiveDate, NaiveDateTime, Timelike, Utc};
use sqlx::SqlitePool;

use crate::db::models::{MetricKind, MetricRecord};
use crate::db::retry_once;
use crate::directory::EntityDirectory;
use crate::error::{CrmError, Result};
use crate::period;

#[derive(Clone)]
pub struct MetricStore {
    pool: SqlitePool,
    directory: EntityDirectory,
}

impl MetricStore {
    pub fn new(pool: SqlitePool, directory: EntityDirectory) -> Self {
        Self { pool, directory }
    }

    /// Add `amount` to the entity's accumulators for the day of `at`.
    ///
    /// The day record is created on first contribution, seeded with the
    /// weekly/monthly sums of the records already present in that date's own
    /// week and month. Backfilled dates therefore land in the week/month they
    /// actually belong to, not the caller's wall-clock week.
    pub async fn record_contribution(
        &self,
        entity_id: &str,
        kind: MetricKind,
        amount: i64,
        at: NaiveDateTime,
    ) -> Result<MetricRecord> {
        if amount < 0 {
            return Err(CrmError::InvalidAmount(format!(
                "contribution must be non-negative, got {amount}"
            )));
        }

        self.directory.find_by_id(entity_id).await?;

        let date = period::day_key(at);
        self.ensure_record(entity_id, kind, date).await?;

        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, MetricRecord>(
            "UPDATE metric_records
             SET daily_value = daily_value + ?4,
                 weekly_value = weekly_value + ?4,
                 monthly_value = monthly_value + ?4,
                 updated_at = ?5
             WHERE entity_id = ?1 AND kind = ?2 AND date = ?3
             RETURNING *",
        )
        .bind(entity_id)
        .bind(kind)
        .bind(date)
        .bind(amount)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO metric_hours (entity_id, kind, date, hour, value)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(entity_id, kind, date, hour)
             DO UPDATE SET value = value + excluded.value",
        )
        .bind(entity_id)
        .bind(kind)
        .bind(date)
        .bind(at.hour() as i64)
        .bind(amount)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(record)
    }

    /// Today's record for the entity, created empty (with seeded running
    /// totals) if absent. A read that may write; callers treat it as idempotent.
    pub async fn get_today(
        &self,
        entity_id: &str,
        kind: MetricKind,
        now: NaiveDateTime,
    ) -> Result<MetricRecord> {
        self.directory.find_by_id(entity_id).await?;
        self.ensure_record(entity_id, kind, period::day_key(now)).await
    }

    pub async fn find_record(
        &self,
        entity_id: &str,
        kind: MetricKind,
        date: NaiveDate,
    ) -> Result<Option<MetricRecord>> {
        retry_once(|| async {
            sqlx::query_as::<_, MetricRecord>(
                "SELECT * FROM metric_records WHERE entity_id = ?1 AND kind = ?2 AND date = ?3",
            )
            .bind(entity_id)
            .bind(kind)
            .bind(date)
            .fetch_optional(&self.pool)
            .await
        })
        .await
    }

    /// Find-or-create the (entity, kind, date) row. On create the weekly and
    /// monthly values start from the sums of the prior records in that date's
    /// week and month, so a fresh day carries the correct running totals.
    /// Creation races resolve through the composite uniqueness constraint.
    pub async fn ensure_record(
        &self,
        entity_id: &str,
        kind: MetricKind,
        date: NaiveDate,
    ) -> Result<MetricRecord> {
        if let Some(record) = self.find_record(entity_id, kind, date).await? {
            return Ok(record);
        }

        let (week_start, _) = period::week_bounds_of(date);
        let month_start = period::month_start_of(date);
        let weekly_seed = self.sum_daily(entity_id, kind, week_start, date).await?;
        let monthly_seed = self.sum_daily(entity_id, kind, month_start, date).await?;

        sqlx::query(
            "INSERT INTO metric_records
                 (entity_id, kind, date, daily_value, weekly_value, monthly_value, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6, ?6)
             ON CONFLICT(entity_id, kind, date) DO NOTHING",
        )
        .bind(entity_id)
        .bind(kind)
        .bind(date)
        .bind(weekly_seed)
        .bind(monthly_seed)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.find_record(entity_id, kind, date)
            .await?
            .ok_or_else(|| CrmError::StorageUnavailable("metric record missing after insert".to_string()))
    }

    // sum of daily values over [from, to), used to seed a newly created day
    async fn sum_daily(
        &self,
        entity_id: &str,
        kind: MetricKind,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<i64> {
        let sum = retry_once(|| async {
            sqlx::query_scalar::<_, i64>(
                "SELECT COALESCE(SUM(daily_value), 0) FROM metric_records
                 WHERE entity_id = ?1 AND kind = ?2 AND date >= ?3 AND date < ?4",
            )
            .bind(entity_id)
            .bind(kind)
            .bind(from)
            .bind(to)
            .fetch_one(&self.pool)
            .await
        })
        .await?;

        Ok(sum)
    }

    /// Contributions bucketed by hour of day, one bucket per hour 0-23,
    /// zero-filled for hours with no contribution.
    pub async fn hourly_breakdown(
        &self,
        entity_id: &str,
        kind: MetricKind,
        date: NaiveDate,
    ) -> Result<Vec<i64>> {
        self.directory.find_by_id(entity_id).await?;

        let rows = retry_once(|| async {
            sqlx::query_as::<_, (i64, i64)>(
                "SELECT hour, value FROM metric_hours
                 WHERE entity_id = ?1 AND kind = ?2 AND date = ?3",
            )
            .bind(entity_id)
            .bind(kind)
            .bind(date)
            .fetch_all(&self.pool)
            .await
        })
        .await?;

        let mut buckets = vec![0i64; 24];
        for (hour, value) in rows {
            if (0..24).contains(&hour) {
                buckets[hour as usize] = value;
            }
        }

        Ok(buckets)
    }
}
