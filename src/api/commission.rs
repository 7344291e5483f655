use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::domain::{BillNo, CommissionEntry, UserId};
use crate::error::LedgerError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountQuery {
    pub agent_user_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub agent_user_id: i64,
    pub total_commission: String,
    pub settled_commission: String,
    pub available_commission: String,
}

pub async fn get_account(
    Query(params): Query<AccountQuery>,
    State(state): State<AppState>,
) -> Result<Json<AccountResponse>, LedgerError> {
    let account = state
        .settlements
        .get_account(UserId::new(params.agent_user_id))
        .await?;

    Ok(Json(AccountResponse {
        agent_user_id: account.agent_user_id.as_i64(),
        total_commission: account.total_commission.to_canonical_string(),
        settled_commission: account.settled_commission.to_canonical_string(),
        available_commission: account.available().to_canonical_string(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsQuery {
    pub agent_user_id: i64,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionRecordDto {
    pub bill_no: String,
    pub buyer_user_id: i64,
    pub level: u8,
    pub rate: String,
    pub recharge_amount: String,
    pub commission_amount: String,
}

impl From<&CommissionEntry> for CommissionRecordDto {
    fn from(e: &CommissionEntry) -> Self {
        Self {
            bill_no: e.bill_no.as_str().to_string(),
            buyer_user_id: e.buyer_user_id.as_i64(),
            level: e.level,
            rate: e.rate.to_canonical_string(),
            recharge_amount: e.recharge_amount.to_canonical_string(),
            commission_amount: e.commission_amount.to_canonical_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsResponse {
    pub records: Vec<CommissionRecordDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaccrueBody {
    pub bill_no: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaccrueResponse {
    pub bill_no: String,
    pub applied: Vec<CommissionRecordDto>,
    pub failed_levels: Vec<u8>,
    pub complete: bool,
}

/// Re-run the accrual for a recharge bill; applied levels are no-ops.
pub async fn reaccrue(
    State(state): State<AppState>,
    Json(body): Json<ReaccrueBody>,
) -> Result<Json<ReaccrueResponse>, LedgerError> {
    let bill_no = BillNo::new(body.bill_no.clone());
    let report = state.commission.accrue_for_bill(&bill_no).await?;

    Ok(Json(ReaccrueResponse {
        bill_no: body.bill_no,
        applied: report.applied.iter().map(CommissionRecordDto::from).collect(),
        complete: report.is_complete(),
        failed_levels: report.failed_levels,
    }))
}

pub async fn get_records(
    Query(params): Query<RecordsQuery>,
    State(state): State<AppState>,
) -> Result<Json<RecordsResponse>, LedgerError> {
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);
    let entries = state
        .commission
        .entries(UserId::new(params.agent_user_id), limit)
        .await?;
    Ok(Json(RecordsResponse {
        records: entries.iter().map(CommissionRecordDto::from).collect(),
    }))
}
