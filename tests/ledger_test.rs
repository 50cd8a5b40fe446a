mod common;

use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc, Weekday};
use crm_ledger::error::CrmError;

// 2024-01-03 is a Wednesday; the enclosing bank week is 2024-01-01 .. 2024-01-06
fn midweek() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 3)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

#[tokio::test]
async fn current_bank_is_created_once_per_week() {
    let ctx = common::setup().await;

    let first = ctx.ledger.current_bank(midweek()).await.unwrap();
    assert_eq!(first.period_start.weekday(), Weekday::Mon);
    assert_eq!(first.period_start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    assert_eq!(first.period_end, NaiveDate::from_ymd_opt(2024, 1, 6).unwrap());
    assert_eq!(first.amount, 100_000); // 1000 units seeded, stored as minor units

    let second = ctx.ledger.current_bank(midweek()).await.unwrap();
    assert_eq!(second.id, first.id);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bank_periods")
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn concurrent_first_access_creates_a_single_bank() {
    let ctx = common::setup().await;

    let mut set = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let ledger = ctx.ledger.clone();
        set.spawn(async move { ledger.current_bank(midweek()).await });
    }

    let mut ids = Vec::new();
    while let Some(result) = set.join_next().await {
        ids.push(result.unwrap().unwrap().id);
    }

    assert_eq!(ids.len(), 8);
    assert!(ids.iter().all(|&id| id == ids[0]));
}

#[tokio::test]
async fn withdraw_decrements_balance_and_records_transaction() {
    let ctx = common::setup().await;
    ctx.directory.register("w1", "Ada", "worker").await.unwrap();

    let bank = ctx.ledger.current_bank(midweek()).await.unwrap();
    let (transaction, bank) = ctx
        .ledger
        .withdraw(bank.id, 250.0, "w1", "office supplies")
        .await
        .unwrap();

    assert_eq!(transaction.amount, 25_000);
    assert_eq!(transaction.user_id, "w1");
    assert_eq!(transaction.reason, "office supplies");
    assert_eq!(bank.amount, 75_000);

    let listed = ctx.ledger.list_transactions(Some("w1"), 10).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, transaction.id);
}

#[tokio::test]
async fn withdraw_fails_on_insufficient_funds() {
    let ctx = common::setup().await;
    ctx.directory.register("w1", "Ada", "worker").await.unwrap();

    let bank = ctx.ledger.current_bank(midweek()).await.unwrap();
    let err = ctx
        .ledger
        .withdraw(bank.id, 2000.0, "w1", "too much")
        .await
        .unwrap_err();

    match err {
        CrmError::InsufficientFunds { available, requested } => {
            assert_eq!(available, 100_000);
            assert_eq!(requested, 200_000);
        }
        other => panic!("expected InsufficientFunds, got {other:?}"),
    }

    // nothing was recorded and the balance is untouched
    let listed = ctx.ledger.list_transactions(None, 10).await.unwrap();
    assert!(listed.is_empty());
    assert_eq!(ctx.ledger.find_bank(bank.id).await.unwrap().amount, 100_000);
}

#[tokio::test]
async fn withdraw_rejects_invalid_amounts() {
    let ctx = common::setup().await;
    ctx.directory.register("w1", "Ada", "worker").await.unwrap();
    let bank = ctx.ledger.current_bank(midweek()).await.unwrap();

    for bad in [0.0, -5.0, f64::NAN, f64::INFINITY] {
        let err = ctx.ledger.withdraw(bank.id, bad, "w1", "bad").await.unwrap_err();
        assert!(matches!(err, CrmError::InvalidAmount(_)), "amount {bad} gave {err:?}");
    }
}

#[tokio::test]
async fn withdraw_requires_a_known_user() {
    let ctx = common::setup().await;
    let bank = ctx.ledger.current_bank(midweek()).await.unwrap();

    let err = ctx
        .ledger
        .withdraw(bank.id, 10.0, "ghost", "nope")
        .await
        .unwrap_err();
    assert!(matches!(err, CrmError::EntityNotFound(_)));
}

#[tokio::test]
async fn transactions_cannot_reference_an_unknown_user() {
    let ctx = common::setup().await;

    // the foreign key on user_id is enforced even for writes that bypass the
    // service layer
    let result = sqlx::query(
        "INSERT INTO ledger_transactions (user_id, amount, reason, day, created_at)
         VALUES ('ghost', 100, 'rogue', '2024-01-03', '2024-01-03T12:00:00Z')",
    )
    .execute(&ctx.pool)
    .await;

    let err = result.unwrap_err();
    assert!(err.to_string().contains("FOREIGN KEY"), "got {err}");
}

#[tokio::test]
async fn concurrent_withdrawals_never_double_spend() {
    let ctx = common::setup().await;
    ctx.directory.register("w1", "Ada", "worker").await.unwrap();

    let bank = ctx.ledger.current_bank(midweek()).await.unwrap();
    // balance exactly 3 * 10.00: ten concurrent withdrawals of 10.00 must
    // yield exactly three successes
    ctx.ledger.set_balance(bank.id, 30.0).await.unwrap();

    let mut set = tokio::task::JoinSet::new();
    for _ in 0..10 {
        let ledger = ctx.ledger.clone();
        let bank_id = bank.id;
        set.spawn(async move { ledger.withdraw(bank_id, 10.0, "w1", "race").await });
    }

    let mut successes = 0;
    let mut insufficient = 0;
    while let Some(result) = set.join_next().await {
        match result.unwrap() {
            Ok(_) => successes += 1,
            Err(CrmError::InsufficientFunds { .. }) => insufficient += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(successes, 3);
    assert_eq!(insufficient, 7);
    assert_eq!(ctx.ledger.find_bank(bank.id).await.unwrap().amount, 0);
}

#[tokio::test]
async fn final_balance_equals_seed_minus_successful_withdrawals() {
    let ctx = common::setup().await;
    ctx.directory.register("w1", "Ada", "worker").await.unwrap();
    let bank = ctx.ledger.current_bank(midweek()).await.unwrap();

    let mut set = tokio::task::JoinSet::new();
    for amount in [300.0, 300.0, 300.0, 300.0, 100.0, 100.0] {
        let ledger = ctx.ledger.clone();
        let bank_id = bank.id;
        set.spawn(async move { ledger.withdraw(bank_id, amount, "w1", "mixed").await });
    }

    let mut successful_total = 0i64;
    while let Some(result) = set.join_next().await {
        if let Ok((transaction, _)) = result.unwrap() {
            successful_total += transaction.amount;
        }
    }

    let final_balance = ctx.ledger.find_bank(bank.id).await.unwrap().amount;
    assert!(final_balance >= 0);
    assert_eq!(final_balance, 100_000 - successful_total);
}

#[tokio::test]
async fn set_balance_rejects_invalid_input_and_leaves_balance_unchanged() {
    let ctx = common::setup().await;
    let bank = ctx.ledger.current_bank(midweek()).await.unwrap();

    for bad in [-1.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        let err = ctx.ledger.set_balance(bank.id, bad).await.unwrap_err();
        assert!(matches!(err, CrmError::InvalidAmount(_)), "amount {bad} gave {err:?}");
    }

    assert_eq!(ctx.ledger.find_bank(bank.id).await.unwrap().amount, 100_000);
}

#[tokio::test]
async fn set_balance_fails_for_unknown_bank() {
    let ctx = common::setup().await;
    let err = ctx.ledger.set_balance(999, 10.0).await.unwrap_err();
    assert!(matches!(err, CrmError::BankNotFound(999)));
}

#[tokio::test]
async fn weekly_report_aggregates_transactions_into_weekdays() {
    let ctx = common::setup().await;
    ctx.directory.register("w1", "Ada", "worker").await.unwrap();
    let bank = ctx.ledger.current_bank(midweek()).await.unwrap();

    for amount in [5.0, 7.0, 3.0] {
        ctx.ledger.withdraw(bank.id, amount, "w1", "daily spend").await.unwrap();
    }

    // spread the three transactions across Monday, Tuesday and Wednesday of
    // the bank's week so the per-day breakdown is deterministic
    let transactions = ctx.ledger.list_transactions(None, 10).await.unwrap();
    assert_eq!(transactions.len(), 3);
    for (offset, transaction) in transactions.iter().rev().enumerate() {
        let day = bank.period_start + chrono::Duration::days(offset as i64);
        let stamp = Utc.from_utc_datetime(&day.and_hms_opt(10, 0, 0).unwrap());
        sqlx::query("UPDATE ledger_transactions SET day = ?1, created_at = ?2 WHERE id = ?3")
            .bind(day)
            .bind(stamp)
            .bind(transaction.id)
            .execute(&ctx.pool)
            .await
            .unwrap();
    }

    let report = ctx.ledger.weekly_report(bank.id).await.unwrap();
    assert_eq!(report.total_transactions, 3);
    assert_eq!(report.total_amount, 100_000 - 1_500);
    assert_eq!(report.days.len(), 6);

    let active_days: Vec<_> = report.days.iter().filter(|d| d.count > 0).collect();
    assert_eq!(active_days.len(), 3);
    assert_eq!(active_days.iter().map(|d| d.total).sum::<i64>(), 1_500);
}

#[tokio::test]
async fn weekly_report_buckets_by_local_day_not_utc_instant() {
    let ctx = common::setup().await;
    ctx.directory.register("w1", "Ada", "worker").await.unwrap();
    let bank = ctx.ledger.current_bank(midweek()).await.unwrap();

    ctx.ledger.withdraw(bank.id, 12.0, "w1", "late night").await.unwrap();

    // a withdrawal made shortly after local Monday midnight in a UTC+3 locale
    // carries a UTC instant that still reads as Sunday; the stored local day
    // decides the bucket, so it must land on Monday all the same
    let transaction = &ctx.ledger.list_transactions(None, 1).await.unwrap()[0];
    let sunday_evening = Utc.from_utc_datetime(
        &(bank.period_start - chrono::Duration::days(1))
            .and_hms_opt(21, 30, 0)
            .unwrap(),
    );
    sqlx::query("UPDATE ledger_transactions SET day = ?1, created_at = ?2 WHERE id = ?3")
        .bind(bank.period_start)
        .bind(sunday_evening)
        .bind(transaction.id)
        .execute(&ctx.pool)
        .await
        .unwrap();

    let report = ctx.ledger.weekly_report(bank.id).await.unwrap();
    assert_eq!(report.total_transactions, 1);
    assert_eq!(report.days[0].date, bank.period_start);
    assert_eq!(report.days[0].count, 1);
    assert_eq!(report.days[0].total, 1_200);
}

#[tokio::test]
async fn weekly_report_fails_for_unknown_bank() {
    let ctx = common::setup().await;
    let err = ctx.ledger.weekly_report(42).await.unwrap_err();
    assert!(matches!(err, CrmError::BankNotFound(42)));
}
