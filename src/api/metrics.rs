use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::models::{MetricKind, MetricRecord};
use crate::error::{CrmError, Result};
use crate::ledger::to_minor_units;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ContributionRequest {
    pub entity_id: String,
    pub kind: MetricKind,
    pub amount: f64,
}

#[derive(Debug, Serialize)]
pub struct MetricResponse {
    pub record: MetricRecord,
}

pub async fn record_contribution(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ContributionRequest>,
) -> Result<Json<MetricResponse>> {
    // earnings arrive as decimal currency, productivity counts as whole numbers
    let value = match req.kind {
        MetricKind::Earnings => to_minor_units(req.amount)?,
        MetricKind::Codes => {
            if !req.amount.is_finite() || req.amount < 0.0 || req.amount.fract() != 0.0 {
                return Err(CrmError::InvalidAmount(format!(
                    "count must be a non-negative whole number, got {}",
                    req.amount
                )));
            }
            req.amount as i64
        }
    };

    let record = state
        .metrics
        .record_contribution(&req.entity_id, req.kind, value, Local::now().naive_local())
        .await?;

    Ok(Json(MetricResponse { record }))
}

#[derive(Debug, Deserialize)]
pub struct KindQuery {
    pub kind: MetricKind,
}

pub async fn get_today(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
    Query(query): Query<KindQuery>,
) -> Result<Json<MetricResponse>> {
    let record = state
        .metrics
        .get_today(&entity_id, query.kind, Local::now().naive_local())
        .await?;

    Ok(Json(MetricResponse { record }))
}

#[derive(Debug, Deserialize)]
pub struct HourlyQuery {
    pub kind: MetricKind,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct HourlyResponse {
    pub entity_id: String,
    pub date: NaiveDate,
    // one bucket per hour 0-23
    pub hours: Vec<i64>,
}

pub async fn hourly_breakdown(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
    Query(query): Query<HourlyQuery>,
) -> Result<Json<HourlyResponse>> {
    let date = query.date.unwrap_or_else(|| Local::now().date_naive());
    let hours = state
        .metrics
        .hourly_breakdown(&entity_id, query.kind, date)
        .await?;

    Ok(Json(HourlyResponse {
        entity_id,
        date,
        hours,
    }))
}
