use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::domain::{BillingRecord, Decimal, UserBalance, UserId};
use crate::engine::DeductRequest;
use crate::error::LedgerError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceDto {
    pub user_id: i64,
    pub dr_balance: String,
    pub pre_deducted_balance: String,
    pub frozen_amount: String,
    pub available: String,
    pub total_recharge: String,
    pub total_consume: String,
    pub total_refund: String,
    pub status: String,
    pub version: i64,
}

impl From<&UserBalance> for BalanceDto {
    fn from(b: &UserBalance) -> Self {
        Self {
            user_id: b.user_id.as_i64(),
            dr_balance: b.dr_balance.to_canonical_string(),
            pre_deducted_balance: b.pre_deducted_balance.to_canonical_string(),
            frozen_amount: b.frozen_amount.to_canonical_string(),
            available: b.available().to_canonical_string(),
            total_recharge: b.total_recharge.to_canonical_string(),
            total_consume: b.total_consume.to_canonical_string(),
            total_refund: b.total_refund.to_canonical_string(),
            status: b.status.as_str().to_string(),
            version: b.version,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDto {
    pub bill_id: i64,
    pub bill_no: String,
    pub user_id: i64,
    pub operator_id: i64,
    pub bill_type: String,
    pub billing_type: String,
    pub business_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_id: Option<String>,
    pub amount: String,
    pub balance_before: String,
    pub balance_after: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer: Option<String>,
}

impl From<&BillingRecord> for RecordDto {
    fn from(r: &BillingRecord) -> Self {
        Self {
            bill_id: r.bill_id,
            bill_no: r.bill_no.as_str().to_string(),
            user_id: r.user_id.as_i64(),
            operator_id: r.operator_id.as_i64(),
            bill_type: r.bill_type.as_str().to_string(),
            billing_type: r.billing_type.as_str().to_string(),
            business_type: r.business_type.clone(),
            business_id: r.business_id.clone(),
            amount: r.amount.to_canonical_string(),
            balance_before: r.balance_before.to_canonical_string(),
            balance_after: r.balance_after.to_canonical_string(),
            description: r.description.clone(),
            extra_data: r.extra_data.clone(),
            consumer: r.consumer.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RechargeBody {
    pub user_id: i64,
    pub amount: Decimal,
    pub operator_id: i64,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionEntryDto {
    pub agent_user_id: i64,
    pub level: u8,
    pub rate: String,
    pub commission_amount: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RechargeResponse {
    pub account_id: i64,
    pub bill_no: String,
    pub balance: BalanceDto,
    pub commission_entries: Vec<CommissionEntryDto>,
    /// False when some commission level is still owed for this bill; see
    /// `/v1/commission/reaccrue`.
    pub commission_complete: bool,
}

pub async fn recharge(
    State(state): State<AppState>,
    Json(body): Json<RechargeBody>,
) -> Result<Json<RechargeResponse>, LedgerError> {
    let receipt = state
        .ledger
        .recharge(
            UserId::new(body.user_id),
            body.amount,
            UserId::new(body.operator_id),
            body.description.as_deref().unwrap_or("recharge"),
        )
        .await?;

    let commission_entries = receipt
        .commission_entries
        .iter()
        .map(|e| CommissionEntryDto {
            agent_user_id: e.agent_user_id.as_i64(),
            level: e.level,
            rate: e.rate.to_canonical_string(),
            commission_amount: e.commission_amount.to_canonical_string(),
        })
        .collect();

    Ok(Json(RechargeResponse {
        account_id: receipt.account_id.as_i64(),
        bill_no: receipt.mutation.bill_no.as_str().to_string(),
        balance: BalanceDto::from(&receipt.mutation.balance),
        commission_entries,
        commission_complete: receipt.commission_complete,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeductBody {
    pub user_id: i64,
    pub amount: Decimal,
    pub operator_id: i64,
    pub business_type: String,
    pub business_id: Option<String>,
    pub description: Option<String>,
    pub consumer: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationResponse {
    pub bill_no: String,
    pub balance: BalanceDto,
}

pub async fn deduct(
    State(state): State<AppState>,
    Json(body): Json<DeductBody>,
) -> Result<Json<MutationResponse>, LedgerError> {
    let committed = state
        .ledger
        .deduct(DeductRequest {
            user_id: UserId::new(body.user_id),
            amount: body.amount,
            operator_id: UserId::new(body.operator_id),
            business_type: body.business_type,
            business_id: body.business_id,
            description: body.description.unwrap_or_else(|| "deduction".to_string()),
            consumer: body.consumer,
        })
        .await?;

    Ok(Json(MutationResponse {
        bill_no: committed.bill_no.as_str().to_string(),
        balance: BalanceDto::from(&committed.balance),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustBody {
    pub user_id: i64,
    /// Signed: positive credits, negative debits.
    pub amount: Decimal,
    pub operator_id: i64,
    pub remark: String,
}

pub async fn adjust(
    State(state): State<AppState>,
    Json(body): Json<AdjustBody>,
) -> Result<Json<MutationResponse>, LedgerError> {
    let committed = state
        .ledger
        .manual_adjust(
            UserId::new(body.user_id),
            body.amount,
            UserId::new(body.operator_id),
            &body.remark,
        )
        .await?;

    Ok(Json(MutationResponse {
        bill_no: committed.bill_no.as_str().to_string(),
        balance: BalanceDto::from(&committed.balance),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceQuery {
    pub user_id: i64,
}

pub async fn get_balance(
    Query(params): Query<BalanceQuery>,
    State(state): State<AppState>,
) -> Result<Json<BalanceDto>, LedgerError> {
    let balance = state.ledger.get_balance(UserId::new(params.user_id)).await?;
    Ok(Json(BalanceDto::from(&balance)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsQuery {
    pub user_id: i64,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsResponse {
    pub records: Vec<RecordDto>,
}

pub async fn get_records(
    Query(params): Query<RecordsQuery>,
    State(state): State<AppState>,
) -> Result<Json<RecordsResponse>, LedgerError> {
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);
    let records = state
        .ledger
        .records(UserId::new(params.user_id), limit)
        .await?;
    Ok(Json(RecordsResponse {
        records: records.iter().map(RecordDto::from).collect(),
    }))
}
