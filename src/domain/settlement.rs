//! Commission settlement request and its state machine.

use crate::domain::{Decimal, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Settlement lifecycle. PENDING is the sole initial state; the other three
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Pending => "PENDING",
            SettlementStatus::Approved => "APPROVED",
            SettlementStatus::Rejected => "REJECTED",
            SettlementStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(SettlementStatus::Pending),
            "APPROVED" => Some(SettlementStatus::Approved),
            "REJECTED" => Some(SettlementStatus::Rejected),
            "CANCELLED" => Some(SettlementStatus::Cancelled),
            _ => None,
        }
    }

    /// Valid transitions: PENDING -> {APPROVED, REJECTED, CANCELLED}.
    pub fn can_transition_to(&self, next: SettlementStatus) -> bool {
        matches!(
            (self, next),
            (
                SettlementStatus::Pending,
                SettlementStatus::Approved
                    | SettlementStatus::Rejected
                    | SettlementStatus::Cancelled
            )
        )
    }

    pub fn is_terminal(&self) -> bool {
        *self != SettlementStatus::Pending
    }
}

impl std::fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An agent's payout request for accrued commission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionSettlement {
    /// Database id; 0 until persisted.
    pub settlement_id: i64,
    pub agent_user_id: UserId,
    pub requested_amount: Decimal,
    pub approved_amount: Option<Decimal>,
    pub operator_id: Option<UserId>,
    pub remark: Option<String>,
    /// Payout destination.
    pub network: String,
    pub address: String,
    pub status: SettlementStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CommissionSettlement {
    /// A fresh PENDING request.
    pub fn new_pending(
        agent_user_id: UserId,
        requested_amount: Decimal,
        network: String,
        address: String,
        remark: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            settlement_id: 0,
            agent_user_id,
            requested_amount,
            approved_amount: None,
            operator_id: None,
            remark,
            network,
            address,
            status: SettlementStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}
