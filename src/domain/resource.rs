//! Billable resource registered for daily recurring charges.

use crate::domain::{Decimal, ResourceId, UserId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Whether a resource is still accruing daily charges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceStatus {
    Active,
    Stopped,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Active => "ACTIVE",
            ResourceStatus::Stopped => "STOPPED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(ResourceStatus::Active),
            "STOPPED" => Some(ResourceStatus::Stopped),
            _ => None,
        }
    }
}

/// A resource the daily tick bills. Registered when the creation-time
/// pre-deduction succeeds; `owner_user_id` is always a root account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillableResource {
    pub resource_id: ResourceId,
    pub owner_user_id: UserId,
    pub business_type: String,
    pub status: ResourceStatus,
    pub total_billed_days: i64,
    pub total_billed_amount: Decimal,
    /// Last calendar day a daily charge was applied; guards the tick against
    /// double-charging within one day.
    pub last_billed_day: Option<NaiveDate>,
}
