//! Public ledger operations: the entry points the API layer calls.
//!
//! All operations resolve the caller to their root account first; dependent
//! accounts never hold balance. Recharges fan commission out to ancestor
//! agents after the credit commits.

use crate::db::Repository;
use crate::domain::{BillingRecord, CommissionEntry, Decimal, UserBalance, UserId};
use crate::engine::balance_store::{BalanceStore, BillingDetails, CommittedMutation};
use crate::engine::commission::CommissionEngine;
use crate::error::LedgerError;
use crate::hierarchy::OrgDirectory;
use std::sync::Arc;
use tracing::warn;

/// Business context for a deduction.
#[derive(Debug, Clone)]
pub struct DeductRequest {
    pub user_id: UserId,
    pub amount: Decimal,
    pub operator_id: UserId,
    pub business_type: String,
    pub business_id: Option<String>,
    pub description: String,
    /// The dependent account that triggered the charge, when redirected.
    pub consumer: Option<String>,
}

/// A committed recharge: the new root-account balance plus the commission
/// entries that accrued from it.
#[derive(Debug, Clone)]
pub struct RechargeReceipt {
    pub account_id: UserId,
    pub mutation: CommittedMutation,
    pub commission_entries: Vec<CommissionEntry>,
    /// False when some level could not accrue; the bill can be re-accrued
    /// later (idempotent per level).
    pub commission_complete: bool,
}

pub struct LedgerService {
    repo: Arc<Repository>,
    store: Arc<BalanceStore>,
    commission: Arc<CommissionEngine>,
    directory: Arc<dyn OrgDirectory>,
}

impl LedgerService {
    pub fn new(
        repo: Arc<Repository>,
        store: Arc<BalanceStore>,
        commission: Arc<CommissionEngine>,
        directory: Arc<dyn OrgDirectory>,
    ) -> Self {
        Self {
            repo,
            store,
            commission,
            directory,
        }
    }

    /// Credit DR points to the user's root account and accrue commission for
    /// the buyer's ancestor agents.
    ///
    /// The recharge commits first; an accrual failure is logged and never
    /// rolls the recharge back (accrual is idempotent per bill and can be
    /// re-run).
    pub async fn recharge(
        &self,
        user_id: UserId,
        amount: Decimal,
        operator_id: UserId,
        description: &str,
    ) -> Result<RechargeReceipt, LedgerError> {
        let root = self.directory.root_account_id(user_id).await?;
        let details = BillingDetails::instant(operator_id, "RECHARGE", description);
        let mutation = self.store.credit(root, amount, &details).await?;

        let (commission_entries, commission_complete) = match self
            .commission
            .accrue_for_recharge(root, mutation.bill_id, &mutation.bill_no, amount)
            .await
        {
            Ok(report) => {
                if !report.is_complete() {
                    warn!(
                        bill_no = mutation.bill_no.as_str(),
                        account = root.as_i64(),
                        failed_levels = ?report.failed_levels,
                        "commission accrual incomplete after recharge"
                    );
                }
                let complete = report.is_complete();
                (report.applied, complete)
            }
            Err(err) => {
                warn!(
                    bill_no = mutation.bill_no.as_str(),
                    account = root.as_i64(),
                    error = %err,
                    "commission accrual incomplete after recharge"
                );
                (Vec::new(), false)
            }
        };

        Ok(RechargeReceipt {
            account_id: root,
            mutation,
            commission_entries,
            commission_complete,
        })
    }

    /// Debit DR points for a business action.
    ///
    /// A charge redirected from a dependent account runs with overdraft
    /// allowed on the main account; direct charges must fit in the available
    /// balance.
    pub async fn deduct(&self, request: DeductRequest) -> Result<CommittedMutation, LedgerError> {
        let root = self.directory.root_account_id(request.user_id).await?;
        let redirected = root != request.user_id;

        let mut details = BillingDetails::instant(
            request.operator_id,
            &request.business_type,
            &request.description,
        );
        details.business_id = request.business_id.clone();
        details.consumer = request.consumer.clone().or_else(|| {
            redirected.then(|| request.user_id.to_string())
        });

        self.store
            .debit(root, request.amount, &details, redirected)
            .await
    }

    /// Administrative signed adjustment on the user's root account.
    pub async fn manual_adjust(
        &self,
        user_id: UserId,
        signed_amount: Decimal,
        operator_id: UserId,
        remark: &str,
    ) -> Result<CommittedMutation, LedgerError> {
        let root = self.directory.root_account_id(user_id).await?;
        self.store
            .manual_adjust(root, signed_amount, operator_id, remark)
            .await
    }

    /// The root-account balance backing `user_id`.
    pub async fn get_balance(&self, user_id: UserId) -> Result<UserBalance, LedgerError> {
        let root = self.directory.root_account_id(user_id).await?;
        self.store.get_or_create(root).await
    }

    /// Billing history of the root account, newest first.
    pub async fn records(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<BillingRecord>, LedgerError> {
        let root = self.directory.root_account_id(user_id).await?;
        Ok(self.repo.query_billing_records(root, limit).await?)
    }
}
