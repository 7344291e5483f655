//! Domain types for the DR-points ledger and commission engine.
//!
//! This module provides:
//! - Lossless numeric handling via the Decimal wrapper
//! - Domain primitives: UserId, BillNo, ResourceId
//! - Balance, billing record, price catalog, commission, and settlement types
//! - The settlement state machine

pub mod balance;
pub mod billing;
pub mod commission;
pub mod decimal;
pub mod price;
pub mod primitives;
pub mod resource;
pub mod settlement;

pub use balance::{BalanceStatus, UserBalance};
pub use billing::{truncate_text, BillType, BillingRecord, BillingType, MAX_TEXT_LEN};
pub use commission::{CommissionAccount, CommissionEntry};
pub use decimal::Decimal;
pub use price::{
    PriceConfig, PriceStatus, BUSINESS_INSTANCE_MARKETING, BUSINESS_INSTANCE_PRE_DEDUCT,
};
pub use primitives::{BillNo, ResourceId, UserId};
pub use resource::{BillableResource, ResourceStatus};
pub use settlement::{CommissionSettlement, SettlementStatus};
