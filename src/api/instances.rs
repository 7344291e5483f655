use axum::extract::{Query, State};
use axum::Json;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::api::balance::BalanceDto;
use crate::api::AppState;
use crate::domain::{ResourceId, UserId};
use crate::error::LedgerError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreDeductBody {
    pub user_id: i64,
    pub resource_id: String,
    /// Creation time in the billing timezone, `%Y-%m-%dT%H:%M:%S`.
    /// Defaults to the current UTC time.
    pub created_at: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreDeductResponse {
    pub account_id: i64,
    pub resource_id: String,
    pub reserved_amount: String,
    pub first_day_fee: String,
    pub balance: BalanceDto,
}

pub async fn pre_deduct(
    State(state): State<AppState>,
    Json(body): Json<PreDeductBody>,
) -> Result<Json<PreDeductResponse>, LedgerError> {
    let now_local = match &body.created_at {
        Some(raw) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").map_err(|_| {
            LedgerError::Validation(format!(
                "createdAt must be formatted as %Y-%m-%dT%H:%M:%S, got {}",
                raw
            ))
        })?,
        None => chrono::Utc::now().naive_utc(),
    };

    let resource_id = ResourceId::new(body.resource_id.clone());
    let receipt = state
        .billing_cycle
        .pre_deduct_for_instance(UserId::new(body.user_id), &resource_id, now_local)
        .await?;

    Ok(Json(PreDeductResponse {
        account_id: receipt.account_id.as_i64(),
        resource_id: body.resource_id,
        reserved_amount: receipt.reserved_amount.to_canonical_string(),
        first_day_fee: receipt.first_day_fee.to_canonical_string(),
        balance: BalanceDto::from(&receipt.balance),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaQuery {
    pub user_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaResponse {
    pub user_id: i64,
    pub available_instances: i64,
    pub unit_price: String,
}

pub async fn get_quota(
    Query(params): Query<QuotaQuery>,
    State(state): State<AppState>,
) -> Result<Json<QuotaResponse>, LedgerError> {
    let available = state
        .billing_cycle
        .available_marketing_instance_count(UserId::new(params.user_id))
        .await?;
    let unit_price = state.billing_cycle.pre_deduct_unit_price().await?;

    Ok(Json(QuotaResponse {
        user_id: params.user_id,
        available_instances: available,
        unit_price: unit_price.to_canonical_string(),
    }))
}
