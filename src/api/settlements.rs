use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::domain::{CommissionSettlement, Decimal, UserId};
use crate::error::LedgerError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementDto {
    pub settlement_id: i64,
    pub agent_user_id: i64,
    pub requested_amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    pub network: String,
    pub address: String,
    pub status: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<&CommissionSettlement> for SettlementDto {
    fn from(s: &CommissionSettlement) -> Self {
        Self {
            settlement_id: s.settlement_id,
            agent_user_id: s.agent_user_id.as_i64(),
            requested_amount: s.requested_amount.to_canonical_string(),
            approved_amount: s.approved_amount.map(|a| a.to_canonical_string()),
            operator_id: s.operator_id.map(|id| id.as_i64()),
            remark: s.remark.clone(),
            network: s.network.clone(),
            address: s.address.clone(),
            status: s.status.as_str().to_string(),
            created_at: s.created_at.timestamp_millis(),
            updated_at: s.updated_at.timestamp_millis(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyBody {
    pub agent_user_id: i64,
    pub amount: Decimal,
    pub network: String,
    pub address: String,
    pub remark: Option<String>,
}

pub async fn apply(
    State(state): State<AppState>,
    Json(body): Json<ApplyBody>,
) -> Result<Json<SettlementDto>, LedgerError> {
    let settlement = state
        .settlements
        .apply(
            UserId::new(body.agent_user_id),
            body.amount,
            body.network,
            body.address,
            body.remark,
        )
        .await?;
    Ok(Json(SettlementDto::from(&settlement)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveBody {
    pub operator_id: i64,
    pub approved_amount: Option<Decimal>,
    pub remark: Option<String>,
}

pub async fn approve(
    Path(settlement_id): Path<i64>,
    State(state): State<AppState>,
    Json(body): Json<ApproveBody>,
) -> Result<Json<SettlementDto>, LedgerError> {
    let settlement = state
        .settlements
        .approve(
            settlement_id,
            UserId::new(body.operator_id),
            body.approved_amount,
            body.remark,
        )
        .await?;
    Ok(Json(SettlementDto::from(&settlement)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectBody {
    pub operator_id: i64,
    pub remark: Option<String>,
}

pub async fn reject(
    Path(settlement_id): Path<i64>,
    State(state): State<AppState>,
    Json(body): Json<RejectBody>,
) -> Result<Json<SettlementDto>, LedgerError> {
    let settlement = state
        .settlements
        .reject(settlement_id, UserId::new(body.operator_id), body.remark)
        .await?;
    Ok(Json(SettlementDto::from(&settlement)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelBody {
    pub user_id: i64,
    pub remark: Option<String>,
}

pub async fn cancel(
    Path(settlement_id): Path<i64>,
    State(state): State<AppState>,
    Json(body): Json<CancelBody>,
) -> Result<Json<SettlementDto>, LedgerError> {
    let settlement = state
        .settlements
        .cancel(settlement_id, UserId::new(body.user_id), body.remark)
        .await?;
    Ok(Json(SettlementDto::from(&settlement)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub agent_user_id: i64,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    pub settlements: Vec<SettlementDto>,
}

pub async fn list(
    Query(params): Query<ListQuery>,
    State(state): State<AppState>,
) -> Result<Json<ListResponse>, LedgerError> {
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);
    let settlements = state
        .settlements
        .list(UserId::new(params.agent_user_id), limit)
        .await?;
    Ok(Json(ListResponse {
        settlements: settlements.iter().map(SettlementDto::from).collect(),
    }))
}
