//! Settlement workflow over commission accounts.
//!
//! A settlement is PENDING until an operator approves or rejects it, or the
//! agent cancels it. PENDING requests reserve commission implicitly: the sum
//! of an agent's PENDING amounts plus any new request must fit within
//! `total_commission - settled_commission`.

use crate::db::{ApplyOutcome, Repository, TransitionOutcome};
use crate::domain::{
    CommissionAccount, CommissionSettlement, Decimal, SettlementStatus, UserId,
};
use crate::error::LedgerError;
use std::sync::Arc;
use tracing::{debug, info};

pub struct SettlementService {
    repo: Arc<Repository>,
    max_retries: u32,
}

impl SettlementService {
    pub fn new(repo: Arc<Repository>, max_retries: u32) -> Self {
        Self { repo, max_retries }
    }

    /// File a settlement request for accrued commission.
    ///
    /// Fails with `NotFound` when the agent has no commission account, and
    /// with `InsufficientBalance` when the requested amount plus the agent's
    /// already-PENDING requests would exceed the available commission.
    pub async fn apply(
        &self,
        agent_user_id: UserId,
        amount: Decimal,
        network: String,
        address: String,
        remark: Option<String>,
    ) -> Result<CommissionSettlement, LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::Validation(format!(
                "settlement amount must be positive, got {}",
                amount
            )));
        }
        if network.trim().is_empty() || address.trim().is_empty() {
            return Err(LedgerError::Validation(
                "payout network and address are required".to_string(),
            ));
        }

        let request =
            CommissionSettlement::new_pending(agent_user_id, amount, network, address, remark);

        for _attempt in 0..=self.max_retries {
            let account = self.require_account(agent_user_id).await?;
            match self.repo.apply_settlement(&request, account.version).await? {
                ApplyOutcome::Applied(settlement_id) => {
                    info!(
                        settlement_id,
                        agent = agent_user_id.as_i64(),
                        amount = %amount,
                        "settlement requested"
                    );
                    return self.require_settlement(settlement_id).await;
                }
                ApplyOutcome::ExceedsAvailable { available, pending } => {
                    return Err(LedgerError::InsufficientBalance(format!(
                        "requested {} exceeds available commission {} with {} already pending",
                        amount, available, pending
                    )));
                }
                ApplyOutcome::VersionConflict => {
                    debug!(agent = agent_user_id.as_i64(), "settlement apply conflicted, retrying");
                }
            }
        }

        Err(LedgerError::ConcurrencyConflict(format!(
            "settlement apply for agent {} kept conflicting",
            agent_user_id
        )))
    }

    /// Approve a PENDING settlement, paying out `approved_amount` (defaults to
    /// the requested amount). Requires `0 < approved <= requested`.
    pub async fn approve(
        &self,
        settlement_id: i64,
        operator_id: UserId,
        approved_amount: Option<Decimal>,
        remark: Option<String>,
    ) -> Result<CommissionSettlement, LedgerError> {
        let settlement = self.require_settlement(settlement_id).await?;
        self.check_transition(&settlement, SettlementStatus::Approved)?;

        let approved = approved_amount.unwrap_or(settlement.requested_amount);
        if !approved.is_positive() || approved > settlement.requested_amount {
            return Err(LedgerError::Validation(format!(
                "approved amount {} must be positive and at most the requested {}",
                approved, settlement.requested_amount
            )));
        }

        for _attempt in 0..=self.max_retries {
            let account = self.require_account(settlement.agent_user_id).await?;
            let new_settled = account.settled_commission + approved;
            match self
                .repo
                .approve_settlement(
                    settlement_id,
                    settlement.agent_user_id,
                    approved,
                    operator_id,
                    remark.as_deref(),
                    account.version,
                    new_settled,
                )
                .await?
            {
                TransitionOutcome::Done => {
                    info!(
                        settlement_id,
                        agent = settlement.agent_user_id.as_i64(),
                        approved = %approved,
                        "settlement approved"
                    );
                    return self.require_settlement(settlement_id).await;
                }
                TransitionOutcome::NotPending => {
                    return Err(self.not_pending(settlement_id).await?);
                }
                TransitionOutcome::VersionConflict => {
                    debug!(settlement_id, "settlement approve conflicted, retrying");
                }
            }
        }

        Err(LedgerError::ConcurrencyConflict(format!(
            "settlement {} approval kept conflicting",
            settlement_id
        )))
    }

    /// Reject a PENDING settlement (operator action). Releases the implicit
    /// reservation; no account totals change.
    pub async fn reject(
        &self,
        settlement_id: i64,
        operator_id: UserId,
        remark: Option<String>,
    ) -> Result<CommissionSettlement, LedgerError> {
        self.finalize(
            settlement_id,
            SettlementStatus::Rejected,
            operator_id,
            remark,
        )
        .await
    }

    /// Cancel a PENDING settlement. Only the requesting agent may cancel.
    pub async fn cancel(
        &self,
        settlement_id: i64,
        requester_id: UserId,
        remark: Option<String>,
    ) -> Result<CommissionSettlement, LedgerError> {
        let settlement = self.require_settlement(settlement_id).await?;
        if settlement.agent_user_id != requester_id {
            return Err(LedgerError::Validation(format!(
                "settlement {} does not belong to user {}",
                settlement_id, requester_id
            )));
        }
        self.finalize(
            settlement_id,
            SettlementStatus::Cancelled,
            requester_id,
            remark,
        )
        .await
    }

    /// An agent's commission account; zero account if none exists yet.
    pub async fn get_account(
        &self,
        agent_user_id: UserId,
    ) -> Result<CommissionAccount, LedgerError> {
        Ok(self
            .repo
            .get_commission_account(agent_user_id)
            .await?
            .unwrap_or_else(|| CommissionAccount::new_zero(agent_user_id)))
    }

    /// An agent's settlement history, newest first.
    pub async fn list(
        &self,
        agent_user_id: UserId,
        limit: i64,
    ) -> Result<Vec<CommissionSettlement>, LedgerError> {
        Ok(self.repo.list_settlements(agent_user_id, limit).await?)
    }

    pub async fn get(&self, settlement_id: i64) -> Result<CommissionSettlement, LedgerError> {
        self.require_settlement(settlement_id).await
    }

    async fn finalize(
        &self,
        settlement_id: i64,
        status: SettlementStatus,
        operator_id: UserId,
        remark: Option<String>,
    ) -> Result<CommissionSettlement, LedgerError> {
        let settlement = self.require_settlement(settlement_id).await?;
        self.check_transition(&settlement, status)?;

        match self
            .repo
            .finalize_settlement(settlement_id, status, operator_id, remark.as_deref())
            .await?
        {
            TransitionOutcome::Done => {
                info!(settlement_id, status = %status, "settlement finalized");
                self.require_settlement(settlement_id).await
            }
            _ => Err(self.not_pending(settlement_id).await?),
        }
    }

    fn check_transition(
        &self,
        settlement: &CommissionSettlement,
        next: SettlementStatus,
    ) -> Result<(), LedgerError> {
        if settlement.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(LedgerError::InvalidStateTransition(format!(
                "settlement {} is {}, cannot move to {}",
                settlement.settlement_id, settlement.status, next
            )))
        }
    }

    /// Build the error for a transition that lost a race: re-read the row so
    /// the message names the state it actually ended up in.
    async fn not_pending(&self, settlement_id: i64) -> Result<LedgerError, LedgerError> {
        let settlement = self.require_settlement(settlement_id).await?;
        Ok(LedgerError::InvalidStateTransition(format!(
            "settlement {} is {}",
            settlement_id, settlement.status
        )))
    }

    async fn require_settlement(
        &self,
        settlement_id: i64,
    ) -> Result<CommissionSettlement, LedgerError> {
        self.repo
            .get_settlement(settlement_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("settlement {}", settlement_id)))
    }

    async fn require_account(
        &self,
        agent_user_id: UserId,
    ) -> Result<CommissionAccount, LedgerError> {
        self.repo
            .get_commission_account(agent_user_id)
            .await?
            .ok_or_else(|| {
                LedgerError::NotFound(format!("commission account for agent {}", agent_user_id))
            })
    }
}
