//! Business engines layered over the repository.

pub mod balance_store;
pub mod billing_cycle;
pub mod commission;
pub mod ledger;
pub mod settlement;

pub use balance_store::{BalanceStore, BillingDetails, CommittedMutation};
pub use billing_cycle::{prorated_first_day_fee, BillingCycle, PreDeductReceipt, TickSummary};
pub use commission::{AccrualReport, CommissionEngine};
pub use ledger::{DeductRequest, LedgerService, RechargeReceipt};
pub use settlement::SettlementService;
