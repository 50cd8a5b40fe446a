//! Shared financial ledger: one mutable balance per Monday–Saturday week,
//! decremented by withdrawal transactions.
//!
//! The balance is the one piece of contended shared state in the system, so
//! every mutation goes through a single guarded SQL update, never through
//! separate read-then-write steps.

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db::models::{BankPeriod, LedgerTransaction};
use crate::db::retry_once;
use crate::directory::EntityDirectory;
use crate::error::{CrmError, Result};
use crate::period;

/// Convert a caller-supplied decimal amount to i64 minor units.
/// Rejects NaN and infinities; sign checks are up to the caller.
pub fn to_minor_units(amount: f64) -> Result<i64> {
    if !amount.is_finite() {
        return Err(CrmError::InvalidAmount(format!(
            "amount must be a finite number, got {amount}"
        )));
    }
    let units = (amount * 100.0).round();
    if units.abs() >= i64::MAX as f64 {
        return Err(CrmError::InvalidAmount(format!("amount out of range: {amount}")));
    }
    Ok(units as i64)
}

#[derive(Debug, Serialize)]
pub struct WeeklyReport {
    pub bank_id: i64,
    /// Current balance of the bank period, minor units.
    pub total_amount: i64,
    pub total_transactions: i64,
    /// One bucket per weekday of the bank period, Monday through Saturday.
    pub days: Vec<DayBreakdown>,
}

#[derive(Debug, Serialize)]
pub struct DayBreakdown {
    pub date: chrono::NaiveDate,
    pub total: i64,
    pub count: i64,
}

#[derive(Clone)]
pub struct LedgerService {
    pool: SqlitePool,
    directory: EntityDirectory,
    seed_amount: i64,
    max_retry_attempts: u32,
    retry_backoff: Duration,
}

impl LedgerService {
    pub fn new(pool: SqlitePool, directory: EntityDirectory, config: &Config) -> Self {
        Self {
            pool,
            directory,
            seed_amount: config.bank_seed_amount * 100,
            max_retry_attempts: config.max_retry_attempts.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Bank period containing `now`, created with the configured seed amount
    /// if this is the first access in a new week. Concurrent first-callers are
    /// resolved by the uniqueness constraint on period_start: the insert is
    /// insert-if-absent and everyone re-reads the winner.
    pub async fn current_bank(&self, now: NaiveDateTime) -> Result<BankPeriod> {
        let (start, end) = period::week_bounds(now);

        if let Some(bank) = self.find_by_period_start(start).await? {
            return Ok(bank);
        }

        sqlx::query(
            "INSERT INTO bank_periods (amount, period_start, period_end, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(period_start) DO NOTHING",
        )
        .bind(self.seed_amount)
        .bind(start)
        .bind(end)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        tracing::info!("Opened bank period {} .. {}", start, end);

        self.find_by_period_start(start)
            .await?
            .ok_or_else(|| CrmError::StorageUnavailable("bank period missing after insert".to_string()))
    }

    async fn find_by_period_start(&self, start: chrono::NaiveDate) -> Result<Option<BankPeriod>> {
        retry_once(|| async {
            sqlx::query_as::<_, BankPeriod>("SELECT * FROM bank_periods WHERE period_start = ?1")
                .bind(start)
                .fetch_optional(&self.pool)
                .await
        })
        .await
    }

    pub async fn find_bank(&self, bank_id: i64) -> Result<BankPeriod> {
        retry_once(|| async {
            sqlx::query_as::<_, BankPeriod>("SELECT * FROM bank_periods WHERE id = ?1")
                .bind(bank_id)
                .fetch_optional(&self.pool)
                .await
        })
        .await?
        .ok_or(CrmError::BankNotFound(bank_id))
    }

    /// Withdraw `amount` from the bank, recording a transaction for `user_id`.
    /// The decrement and the transaction insert commit atomically; validation
    /// failures are never retried, transient storage failures are retried with
    /// a fixed backoff up to the configured attempt limit.
    pub async fn withdraw(
        &self,
        bank_id: i64,
        amount: f64,
        user_id: &str,
        reason: &str,
    ) -> Result<(LedgerTransaction, BankPeriod)> {
        let units = to_minor_units(amount)?;
        if units <= 0 {
            return Err(CrmError::InvalidAmount(format!(
                "withdrawal amount must be positive, got {amount}"
            )));
        }

        // initiating user must exist before we touch the balance
        self.directory.find_by_id(user_id).await?;

        let mut attempt = 0;
        loop {
            match self.try_withdraw(bank_id, units, user_id, reason).await {
                Err(CrmError::StorageUnavailable(e)) if attempt + 1 < self.max_retry_attempts => {
                    attempt += 1;
                    tracing::warn!(
                        "Withdrawal attempt {} failed, retrying: {}",
                        attempt,
                        e
                    );
                    tokio::time::sleep(self.retry_backoff).await;
                }
                other => return other,
            }
        }
    }

    async fn try_withdraw(
        &self,
        bank_id: i64,
        units: i64,
        user_id: &str,
        reason: &str,
    ) -> Result<(LedgerTransaction, BankPeriod)> {
        let mut tx = self.pool.begin().await?;

        // guarded compare-and-decrement: zero rows means the balance was
        // too small (or the bank does not exist), and nothing changed
        let bank = sqlx::query_as::<_, BankPeriod>(
            "UPDATE bank_periods
             SET amount = amount - ?2, updated_at = ?3
             WHERE id = ?1 AND amount >= ?2
             RETURNING *",
        )
        .bind(bank_id)
        .bind(units)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(bank) = bank else {
            let available = sqlx::query_scalar::<_, i64>("SELECT amount FROM bank_periods WHERE id = ?1")
                .bind(bank_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(CrmError::BankNotFound(bank_id))?;

            return Err(CrmError::InsufficientFunds {
                available,
                requested: units,
            });
        };

        // stamp the local calendar day alongside the UTC instant so report
        // bucketing never depends on the UTC offset
        let transaction = sqlx::query_as::<_, LedgerTransaction>(
            "INSERT INTO ledger_transactions (user_id, amount, reason, day, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING *",
        )
        .bind(user_id)
        .bind(units)
        .bind(reason)
        .bind(period::day_key(Local::now().naive_local()))
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Withdrawal of {} by {} from bank {} (balance now {})",
            units,
            user_id,
            bank_id,
            bank.amount
        );

        Ok((transaction, bank))
    }

    /// Administrative absolute overwrite of a bank balance.
    pub async fn set_balance(&self, bank_id: i64, amount: f64) -> Result<BankPeriod> {
        let units = to_minor_units(amount)?;
        if units < 0 {
            return Err(CrmError::InvalidAmount(format!(
                "balance cannot be negative, got {amount}"
            )));
        }

        let bank = sqlx::query_as::<_, BankPeriod>(
            "UPDATE bank_periods SET amount = ?2, updated_at = ?3 WHERE id = ?1 RETURNING *",
        )
        .bind(bank_id)
        .bind(units)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(CrmError::BankNotFound(bank_id))?;

        tracing::info!("Bank {} balance set to {}", bank_id, units);
        Ok(bank)
    }

    /// Withdrawal history, newest first, optionally filtered to one user.
    pub async fn list_transactions(
        &self,
        user_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<LedgerTransaction>> {
        let limit = limit.clamp(1, 500);

        let transactions = match user_id {
            Some(user) => {
                retry_once(|| async {
                    sqlx::query_as::<_, LedgerTransaction>(
                        "SELECT * FROM ledger_transactions
                         WHERE user_id = ?1
                         ORDER BY created_at DESC, id DESC
                         LIMIT ?2",
                    )
                    .bind(user)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
                })
                .await?
            }
            None => {
                retry_once(|| async {
                    sqlx::query_as::<_, LedgerTransaction>(
                        "SELECT * FROM ledger_transactions
                         ORDER BY created_at DESC, id DESC
                         LIMIT ?1",
                    )
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
                })
                .await?
            }
        };

        Ok(transactions)
    }

    /// Aggregate the transactions created while `bank_id` was current into its
    /// six weekdays. Both the window and the buckets use the local day key
    /// recorded at creation time, so a withdrawal in the first or last hours
    /// of a local day stays on that day regardless of the UTC offset.
    pub async fn weekly_report(&self, bank_id: i64) -> Result<WeeklyReport> {
        let bank = self.find_bank(bank_id).await?;

        let transactions = retry_once(|| async {
            sqlx::query_as::<_, LedgerTransaction>(
                "SELECT * FROM ledger_transactions
                 WHERE day >= ?1 AND day <= ?2
                 ORDER BY created_at ASC",
            )
            .bind(bank.period_start)
            .bind(bank.period_end)
            .fetch_all(&self.pool)
            .await
        })
        .await?;

        let mut days: Vec<DayBreakdown> = (0..6)
            .map(|offset| DayBreakdown {
                date: bank.period_start + ChronoDuration::days(offset),
                total: 0,
                count: 0,
            })
            .collect();

        for t in &transactions {
            if let Some(slot) = days.iter_mut().find(|s| s.date == t.day) {
                slot.total += t.amount;
                slot.count += 1;
            }
        }

        Ok(WeeklyReport {
            bank_id: bank.id,
            total_amount: bank.amount,
            total_transactions: transactions.len() as i64,
            days,
        })
    }
}
