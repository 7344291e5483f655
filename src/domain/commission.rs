//! Agent commission account and accrual history rows.

use crate::domain::{BillNo, Decimal, UserId};
use serde::{Deserialize, Serialize};

/// One row per referring agent.
///
/// `available()` is derived, never stored, so total and settled cannot drift
/// apart from it. `version` is the optimistic-concurrency token shared by
/// accrual and settlement writers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionAccount {
    pub agent_user_id: UserId,
    pub total_commission: Decimal,
    pub settled_commission: Decimal,
    pub version: i64,
}

impl CommissionAccount {
    pub fn new_zero(agent_user_id: UserId) -> Self {
        Self {
            agent_user_id,
            total_commission: Decimal::zero(),
            settled_commission: Decimal::zero(),
            version: 0,
        }
    }

    /// Commission accrued but not yet paid out.
    pub fn available(&self) -> Decimal {
        self.total_commission - self.settled_commission
    }
}

/// One accrual per (billing record, referral level). The unique key on these
/// two columns is what makes replayed accruals no-ops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionEntry {
    pub agent_user_id: UserId,
    pub buyer_user_id: UserId,
    pub bill_id: i64,
    pub bill_no: BillNo,
    /// Referral-chain distance, 1 = nearest ancestor agent.
    pub level: u8,
    pub rate: Decimal,
    pub recharge_amount: Decimal,
    pub commission_amount: Decimal,
}
