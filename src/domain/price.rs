//! Price catalog reference rows.

use crate::domain::{BillingType, Decimal};
use serde::{Deserialize, Serialize};

/// Business type key for the marketing-instance setup reservation.
pub const BUSINESS_INSTANCE_PRE_DEDUCT: &str = "INSTANCE_PRE_DEDUCT";

/// Business type key for marketing-instance daily billing.
pub const BUSINESS_INSTANCE_MARKETING: &str = "INSTANCE_MARKETING";

/// Whether a price config is currently billable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceStatus {
    Active,
    Inactive,
}

impl PriceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceStatus::Active => "ACTIVE",
            PriceStatus::Inactive => "INACTIVE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(PriceStatus::Active),
            "INACTIVE" => Some(PriceStatus::Inactive),
            _ => None,
        }
    }
}

/// One row per business action: maps the action to a unit price and cadence.
/// Read-heavy, rarely written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceConfig {
    pub business_type: String,
    pub business_name: String,
    pub price_unit: String,
    pub dr_price: Decimal,
    pub billing_type: BillingType,
    pub status: PriceStatus,
}

impl PriceConfig {
    pub fn is_active(&self) -> bool {
        self.status == PriceStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_price_status_parse() {
        assert_eq!(PriceStatus::parse("ACTIVE"), Some(PriceStatus::Active));
        assert_eq!(PriceStatus::parse("INACTIVE"), Some(PriceStatus::Inactive));
        assert_eq!(PriceStatus::parse(""), None);
    }

    #[test]
    fn test_is_active() {
        let cfg = PriceConfig {
            business_type: BUSINESS_INSTANCE_MARKETING.to_string(),
            business_name: "Marketing instance".to_string(),
            price_unit: "day".to_string(),
            dr_price: Decimal::from_str("6.00").unwrap(),
            billing_type: BillingType::Daily,
            status: PriceStatus::Active,
        };
        assert!(cfg.is_active());
    }
}
