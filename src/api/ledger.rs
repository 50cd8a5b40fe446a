use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::models::{BankPeriod, LedgerTransaction};
use crate::error::Result;
use crate::ledger::WeeklyReport;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct BankResponse {
    pub bank: BankPeriod,
}

pub async fn get_current_bank(State(state): State<Arc<AppState>>) -> Result<Json<BankResponse>> {
    let bank = state.ledger.current_bank(Local::now().naive_local()).await?;

    Ok(Json(BankResponse { bank }))
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    // caller identity; supplied by the auth layer in the full system
    pub user_id: String,
    pub amount: f64,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct WithdrawResponse {
    pub transaction: LedgerTransaction,
    pub bank: BankPeriod,
}

pub async fn withdraw(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WithdrawRequest>,
) -> Result<Json<WithdrawResponse>> {
    let bank = state.ledger.current_bank(Local::now().naive_local()).await?;
    let (transaction, bank) = state
        .ledger
        .withdraw(bank.id, req.amount, &req.user_id, &req.reason)
        .await?;

    Ok(Json(WithdrawResponse { transaction, bank }))
}

#[derive(Debug, Deserialize)]
pub struct SetBalanceRequest {
    pub bank_id: i64,
    pub amount: f64,
}

pub async fn set_balance(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetBalanceRequest>,
) -> Result<Json<BankResponse>> {
    let bank = state.ledger.set_balance(req.bank_id, req.amount).await?;

    Ok(Json(BankResponse { bank }))
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    pub user_id: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    pub transactions: Vec<LedgerTransaction>,
}

pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<TransactionsResponse>> {
    let transactions = state
        .ledger
        .list_transactions(query.user_id.as_deref(), query.limit.unwrap_or(100))
        .await?;

    Ok(Json(TransactionsResponse { transactions }))
}

pub async fn weekly_report(
    State(state): State<Arc<AppState>>,
    Path(bank_id): Path<i64>,
) -> Result<Json<WeeklyReport>> {
    let report = state.ledger.weekly_report(bank_id).await?;

    Ok(Json(report))
}
