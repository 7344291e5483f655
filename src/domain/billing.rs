//! Append-only billing record: one row per balance mutation.

use crate::domain::{BillNo, Decimal, UserId};
use serde::{Deserialize, Serialize};

/// Maximum length persisted for free-text fields (description, remark,
/// consumer). Longer text is truncated, never rejected: losing tail
/// characters of a description must not fail the enclosing transaction.
pub const MAX_TEXT_LEN: usize = 255;

/// Direction of a balance mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillType {
    Recharge,
    Consume,
    Refund,
}

impl BillType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillType::Recharge => "RECHARGE",
            BillType::Consume => "CONSUME",
            BillType::Refund => "REFUND",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RECHARGE" => Some(BillType::Recharge),
            "CONSUME" => Some(BillType::Consume),
            "REFUND" => Some(BillType::Refund),
            _ => None,
        }
    }

    /// Signed multiplier applied to the recorded amount when reconciling
    /// balance history (+1 for recharge/refund, -1 for consume).
    pub fn sign(&self) -> i32 {
        match self {
            BillType::Recharge | BillType::Refund => 1,
            BillType::Consume => -1,
        }
    }
}

impl std::fmt::Display for BillType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Billing cadence of the business action that caused the mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingType {
    Instant,
    Daily,
}

impl BillingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingType::Instant => "INSTANT",
            BillingType::Daily => "DAILY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INSTANT" => Some(BillingType::Instant),
            "DAILY" => Some(BillingType::Daily),
            _ => None,
        }
    }
}

impl std::fmt::Display for BillingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable ledger row. Never updated or deleted; corrections are new rows
/// (a refund references the original via `business_id`/description).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingRecord {
    /// Database id; 0 until persisted.
    pub bill_id: i64,
    pub bill_no: BillNo,
    pub user_id: UserId,
    pub operator_id: UserId,
    pub bill_type: BillType,
    pub billing_type: BillingType,
    /// Open business tag, e.g. "INSTANCE_MARKETING".
    pub business_type: String,
    pub business_id: Option<String>,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub description: String,
    /// Free-form structured payload, e.g. a pre-deduction before/after snapshot.
    pub extra_data: Option<serde_json::Value>,
    /// Display-only attribution of who consumed the resource.
    pub consumer: Option<String>,
}

impl BillingRecord {
    /// Build a record with a freshly generated bill number and truncated
    /// free-text fields.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: UserId,
        operator_id: UserId,
        bill_type: BillType,
        billing_type: BillingType,
        business_type: &str,
        business_id: Option<&str>,
        amount: Decimal,
        balance_before: Decimal,
        balance_after: Decimal,
        description: &str,
    ) -> Self {
        Self {
            bill_id: 0,
            bill_no: BillNo::generate(),
            user_id,
            operator_id,
            bill_type,
            billing_type,
            business_type: business_type.to_string(),
            business_id: business_id.map(|s| s.to_string()),
            amount,
            balance_before,
            balance_after,
            description: truncate_text(description),
            extra_data: None,
            consumer: None,
        }
    }

    /// Attach a structured payload.
    pub fn with_extra_data(mut self, extra: serde_json::Value) -> Self {
        self.extra_data = Some(extra);
        self
    }

    /// Attach a consumer attribution string (truncated).
    pub fn with_consumer(mut self, consumer: &str) -> Self {
        self.consumer = Some(truncate_text(consumer));
        self
    }

    /// Amount with the bill type's sign applied, for reconciliation sums.
    pub fn signed_amount(&self) -> Decimal {
        if self.bill_type.sign() >= 0 {
            self.amount
        } else {
            -self.amount
        }
    }

    /// Whether before/after/amount are mutually consistent for the bill type.
    pub fn is_consistent(&self) -> bool {
        self.balance_after == self.balance_before + self.signed_amount()
    }
}

/// Truncate free text to [`MAX_TEXT_LEN`] characters on a char boundary.
pub fn truncate_text(s: &str) -> String {
    if s.chars().count() <= MAX_TEXT_LEN {
        s.to_string()
    } else {
        s.chars().take(MAX_TEXT_LEN).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn record(bill_type: BillType, amount: &str, before: &str, after: &str) -> BillingRecord {
        BillingRecord::new(
            UserId::new(1),
            UserId::new(1),
            bill_type,
            BillingType::Instant,
            "TEST",
            None,
            Decimal::from_str(amount).unwrap(),
            Decimal::from_str(before).unwrap(),
            Decimal::from_str(after).unwrap(),
            "test record",
        )
    }

    #[test]
    fn test_sign_convention() {
        assert_eq!(BillType::Recharge.sign(), 1);
        assert_eq!(BillType::Refund.sign(), 1);
        assert_eq!(BillType::Consume.sign(), -1);
    }

    #[test]
    fn test_consistency_check() {
        assert!(record(BillType::Recharge, "100", "50", "150").is_consistent());
        assert!(record(BillType::Consume, "80", "50", "-30").is_consistent());
        assert!(!record(BillType::Consume, "80", "50", "30").is_consistent());
    }

    #[test]
    fn test_bill_no_is_unique_per_record() {
        let a = record(BillType::Recharge, "1", "0", "1");
        let b = record(BillType::Recharge, "1", "0", "1");
        assert_ne!(a.bill_no, b.bill_no);
    }

    #[test]
    fn test_truncate_text_long_description() {
        let long = "x".repeat(MAX_TEXT_LEN + 50);
        let r = BillingRecord::new(
            UserId::new(1),
            UserId::new(1),
            BillType::Consume,
            BillingType::Daily,
            "TEST",
            None,
            Decimal::from_i64(1),
            Decimal::from_i64(1),
            Decimal::zero(),
            &long,
        );
        assert_eq!(r.description.chars().count(), MAX_TEXT_LEN);
    }

    #[test]
    fn test_truncate_text_char_boundary() {
        let s: String = "日".repeat(MAX_TEXT_LEN + 1);
        let truncated = truncate_text(&s);
        assert_eq!(truncated.chars().count(), MAX_TEXT_LEN);
    }

    #[test]
    fn test_bill_type_parse() {
        assert_eq!(BillType::parse("RECHARGE"), Some(BillType::Recharge));
        assert_eq!(BillingType::parse("DAILY"), Some(BillingType::Daily));
        assert_eq!(BillType::parse("nope"), None);
    }
}
