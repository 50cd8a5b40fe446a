use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Spendable balance for one Monday–Saturday week.
/// Rows are never deleted, forming an append-only history of weekly balances.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BankPeriod {
    pub id: i64,
    // all amounts stored as i64 minor units to avoid floating point issues
    pub amount: i64,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub updated_at: DateTime<Utc>,
}

/// Immutable withdrawal record against the bank period current at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LedgerTransaction {
    pub id: i64,
    pub user_id: String,
    pub amount: i64,
    pub reason: String,
    /// Local calendar day the withdrawal was made; reports bucket by this.
    pub day: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Codes,
    Earnings,
}

impl MetricKind {
    pub const ALL: [MetricKind; 2] = [MetricKind::Codes, MetricKind::Earnings];
}

/// One accumulator row per (entity, kind, calendar day).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MetricRecord {
    pub id: i64,
    pub entity_id: String,
    pub kind: MetricKind,
    pub date: NaiveDate,
    pub daily_value: i64,
    pub weekly_value: i64,
    pub monthly_value: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Worker/curator record owned by the excluded users subsystem. The core only
/// looks entities up and resets the denormalized today_count display counter.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EntityRecord {
    pub id: String,
    pub name: String,
    pub role: String,
    pub today_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
