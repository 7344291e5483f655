//! Commission accrual: fans a recharge out to up to three ancestor agents.
//!
//! Each level is an independent atomic unit keyed by (bill_id, level), so
//! the whole accrual is safe to re-run after a partial failure. The
//! triggering recharge is never rolled back from here.

use crate::db::{AccrualOutcome, Repository};
use crate::domain::{BillNo, BillType, CommissionAccount, CommissionEntry, Decimal, UserId};
use crate::error::LedgerError;
use crate::hierarchy::HierarchyResolver;
use std::sync::Arc;
use tracing::{debug, error};

/// Outcome of one accrual invocation.
///
/// `failed_levels` lists levels that could not be applied this time (retry
/// budget exhausted or a storage error); already-applied levels are never in
/// it. Re-running the accrual for the same bill picks up exactly the failed
/// levels.
#[derive(Debug, Clone, Default)]
pub struct AccrualReport {
    /// Entries credited by this invocation.
    pub applied: Vec<CommissionEntry>,
    pub failed_levels: Vec<u8>,
}

impl AccrualReport {
    pub fn is_complete(&self) -> bool {
        self.failed_levels.is_empty()
    }
}

pub struct CommissionEngine {
    repo: Arc<Repository>,
    hierarchy: Arc<dyn HierarchyResolver>,
    /// Per-level rates, index 0 = level 1. Injected, not hard-coded.
    rates: Vec<Decimal>,
    max_retries: u32,
}

impl CommissionEngine {
    pub fn new(
        repo: Arc<Repository>,
        hierarchy: Arc<dyn HierarchyResolver>,
        rates: Vec<Decimal>,
        max_retries: u32,
    ) -> Self {
        Self {
            repo,
            hierarchy,
            rates,
            max_retries,
        }
    }

    /// Fetch an agent's commission account, creating a zero row on first
    /// reference.
    pub async fn get_or_create_account(
        &self,
        agent_user_id: UserId,
    ) -> Result<CommissionAccount, LedgerError> {
        if let Some(account) = self.repo.get_commission_account(agent_user_id).await? {
            return Ok(account);
        }
        self.repo
            .insert_commission_account_if_absent(&CommissionAccount::new_zero(agent_user_id))
            .await?;
        self.repo
            .get_commission_account(agent_user_id)
            .await?
            .ok_or_else(|| {
                LedgerError::Internal(format!("commission account vanished for {}", agent_user_id))
            })
    }

    /// Accrue commission for a recharge billing record.
    ///
    /// Walks the buyer's ancestor agents (at most one per configured level)
    /// and credits `recharge_amount * rate(level)`, rounded half-up to 2
    /// decimals independently per level. Replays are no-ops per level.
    ///
    /// A level that cannot be applied is reported in the result, never by
    /// aborting the fan-out: the remaining levels still get their chance, and
    /// re-invoking for the same bill retries exactly the failed levels.
    pub async fn accrue_for_recharge(
        &self,
        buyer_user_id: UserId,
        bill_id: i64,
        bill_no: &BillNo,
        recharge_amount: Decimal,
    ) -> Result<AccrualReport, LedgerError> {
        let ancestors = self
            .hierarchy
            .agent_ancestors(buyer_user_id, self.rates.len() as u8)
            .await?;

        let mut report = AccrualReport::default();

        for ancestor in &ancestors {
            let rate = match ancestor
                .level
                .checked_sub(1)
                .and_then(|idx| self.rates.get(idx as usize))
            {
                Some(rate) => *rate,
                None => continue,
            };
            let commission = (recharge_amount * rate).round_money();
            if !commission.is_positive() {
                continue;
            }

            let entry = CommissionEntry {
                agent_user_id: ancestor.user_id,
                buyer_user_id,
                bill_id,
                bill_no: bill_no.clone(),
                level: ancestor.level,
                rate,
                recharge_amount,
                commission_amount: commission,
            };

            match self.apply_level(&entry).await {
                Ok(LevelResult::Applied) => report.applied.push(entry),
                Ok(LevelResult::AlreadyApplied) => {
                    debug!(
                        bill_no = bill_no.as_str(),
                        level = entry.level,
                        "accrual already applied, skipping"
                    );
                }
                Ok(LevelResult::Exhausted) => {
                    error!(
                        bill_no = bill_no.as_str(),
                        level = entry.level,
                        agent = entry.agent_user_id.as_i64(),
                        "commission accrual failed after retries; re-run accrual for this bill"
                    );
                    report.failed_levels.push(entry.level);
                }
                Err(err) => {
                    error!(
                        bill_no = bill_no.as_str(),
                        level = entry.level,
                        agent = entry.agent_user_id.as_i64(),
                        error = %err,
                        "commission accrual errored; re-run accrual for this bill"
                    );
                    report.failed_levels.push(entry.level);
                }
            }
        }

        Ok(report)
    }

    /// Re-run the accrual for an existing recharge bill.
    ///
    /// Applied levels are no-ops thanks to the per-level idempotency key, so
    /// this is the remediation path for a partially accrued recharge.
    pub async fn accrue_for_bill(&self, bill_no: &BillNo) -> Result<AccrualReport, LedgerError> {
        let record = self
            .repo
            .get_record_by_bill_no(bill_no)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("bill {}", bill_no)))?;
        if record.bill_type != BillType::Recharge {
            return Err(LedgerError::Validation(format!(
                "bill {} is not a recharge, commission does not apply",
                bill_no
            )));
        }
        self.accrue_for_recharge(record.user_id, record.bill_id, bill_no, record.amount)
            .await
    }

    async fn apply_level(&self, entry: &CommissionEntry) -> Result<LevelResult, LedgerError> {
        for _attempt in 0..=self.max_retries {
            let account = self.get_or_create_account(entry.agent_user_id).await?;
            let new_total = account.total_commission + entry.commission_amount;
            match self
                .repo
                .apply_accrual(entry, account.version, new_total)
                .await?
            {
                AccrualOutcome::Applied => return Ok(LevelResult::Applied),
                AccrualOutcome::AlreadyApplied => return Ok(LevelResult::AlreadyApplied),
                AccrualOutcome::VersionConflict => continue,
            }
        }
        Ok(LevelResult::Exhausted)
    }

    /// An agent's accrual history, newest first.
    pub async fn entries(
        &self,
        agent_user_id: UserId,
        limit: i64,
    ) -> Result<Vec<CommissionEntry>, LedgerError> {
        Ok(self
            .repo
            .query_commission_entries(agent_user_id, limit)
            .await?)
    }
}

enum LevelResult {
    Applied,
    AlreadyApplied,
    Exhausted,
}
