pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod hierarchy;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    BalanceStatus, BillNo, BillType, BillingRecord, BillingType, CommissionAccount,
    CommissionEntry, CommissionSettlement, Decimal, PriceConfig, ResourceId, SettlementStatus,
    UserBalance, UserId,
};
pub use engine::{
    BalanceStore, BillingCycle, CommissionEngine, LedgerService, SettlementService,
};
pub use error::LedgerError;
pub use hierarchy::{HierarchyResolver, MockHierarchy, MockOrgDirectory, OrgDirectory};
