//! Period calculator: pure mappings from a timestamp to the enclosing
//! Monday–Saturday bank week and to calendar day/month boundaries.
//!
//! Sundays map to the week that began the previous Monday, so every instant
//! belongs to exactly one week and weeks never overlap.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// Bank week containing `t`: most recent Monday through the following Saturday.
pub fn week_bounds(t: NaiveDateTime) -> (NaiveDate, NaiveDate) {
    week_bounds_of(t.date())
}

pub fn week_bounds_of(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
    (monday, monday + Duration::days(5))
}

/// Canonical calendar-day key for `t` (rendered `YYYY-MM-DD` at the storage boundary).
pub fn day_key(t: NaiveDateTime) -> NaiveDate {
    t.date()
}

/// First calendar day of `t`'s month.
pub fn month_start(t: NaiveDateTime) -> NaiveDate {
    month_start_of(t.date())
}

pub fn month_start_of(date: NaiveDate) -> NaiveDate {
    date.with_day(1).expect("day 1 exists in every month")
}

/// Delay from `now` until the next midnight. Recomputed by the reset scheduler
/// on every iteration so the cadence never drifts.
pub fn until_next_midnight(now: NaiveDateTime) -> std::time::Duration {
    let next = (now.date() + Duration::days(1)).and_time(NaiveTime::MIN);
    (next - now)
        .to_std()
        .unwrap_or(std::time::Duration::from_secs(1))
}
