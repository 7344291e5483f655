//! Per-user DR-point balance row.

use crate::domain::{Decimal, UserId};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a balance account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BalanceStatus {
    Normal,
    Frozen,
    Cancelled,
}

impl BalanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceStatus::Normal => "NORMAL",
            BalanceStatus::Frozen => "FROZEN",
            BalanceStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NORMAL" => Some(BalanceStatus::Normal),
            "FROZEN" => Some(BalanceStatus::Frozen),
            "CANCELLED" => Some(BalanceStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for BalanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One balance row per user.
///
/// `dr_balance` may go negative only on the overdraft-allowed path (a main
/// account absorbing a dependent account's consumption). `pre_deducted_balance`
/// is earmarked and is never touched by ordinary debits. The counter fields
/// only ever increase. `version` is the optimistic-concurrency token; every
/// committed write increments it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBalance {
    pub user_id: UserId,
    pub dr_balance: Decimal,
    pub pre_deducted_balance: Decimal,
    pub frozen_amount: Decimal,
    pub total_recharge: Decimal,
    pub total_consume: Decimal,
    pub total_refund: Decimal,
    pub version: i64,
    pub status: BalanceStatus,
}

impl UserBalance {
    /// A fresh zero balance for a user seen for the first time.
    pub fn new_zero(user_id: UserId) -> Self {
        Self {
            user_id,
            dr_balance: Decimal::zero(),
            pre_deducted_balance: Decimal::zero(),
            frozen_amount: Decimal::zero(),
            total_recharge: Decimal::zero(),
            total_consume: Decimal::zero(),
            total_refund: Decimal::zero(),
            version: 0,
            status: BalanceStatus::Normal,
        }
    }

    /// Spendable balance for ordinary debits: `dr_balance - frozen_amount`.
    pub fn available(&self) -> Decimal {
        self.dr_balance - self.frozen_amount
    }
}
