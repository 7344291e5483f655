//! Balance store: every credit and debit of DR points passes through here.
//!
//! Each mutation is a read-compute-commit cycle: read the row, compute the
//! new state, commit under the version guard together with exactly one
//! billing record. A version mismatch retries from the read, bounded by
//! `max_retries`.

use crate::db::Repository;
use crate::domain::{
    truncate_text, BalanceStatus, BillNo, BillType, BillingRecord, BillingType, Decimal,
    UserBalance, UserId,
};
use crate::error::LedgerError;
use std::sync::Arc;
use tracing::debug;

/// Business context attached to a balance mutation's billing record.
#[derive(Debug, Clone)]
pub struct BillingDetails {
    pub operator_id: UserId,
    pub billing_type: BillingType,
    pub business_type: String,
    pub business_id: Option<String>,
    pub description: String,
    pub consumer: Option<String>,
}

impl BillingDetails {
    pub fn instant(operator_id: UserId, business_type: &str, description: &str) -> Self {
        Self {
            operator_id,
            billing_type: BillingType::Instant,
            business_type: business_type.to_string(),
            business_id: None,
            description: description.to_string(),
            consumer: None,
        }
    }

    pub fn with_business_id(mut self, business_id: &str) -> Self {
        self.business_id = Some(business_id.to_string());
        self
    }

    pub fn with_billing_type(mut self, billing_type: BillingType) -> Self {
        self.billing_type = billing_type;
        self
    }

    pub fn with_consumer(mut self, consumer: &str) -> Self {
        self.consumer = Some(consumer.to_string());
        self
    }
}

/// A successfully committed mutation: the new balance plus the identity of
/// the billing record written with it.
#[derive(Debug, Clone)]
pub struct CommittedMutation {
    pub balance: UserBalance,
    pub bill_id: i64,
    pub bill_no: BillNo,
}

pub struct BalanceStore {
    repo: Arc<Repository>,
    max_retries: u32,
}

impl BalanceStore {
    pub fn new(repo: Arc<Repository>, max_retries: u32) -> Self {
        Self { repo, max_retries }
    }

    /// Fetch a user's balance, creating a zero row on first reference.
    pub async fn get_or_create(&self, user_id: UserId) -> Result<UserBalance, LedgerError> {
        if let Some(balance) = self.repo.get_balance(user_id).await? {
            return Ok(balance);
        }
        self.repo
            .insert_balance_if_absent(&UserBalance::new_zero(user_id))
            .await?;
        self.repo
            .get_balance(user_id)
            .await?
            .ok_or_else(|| LedgerError::Internal(format!("balance row vanished for {}", user_id)))
    }

    /// Credit `amount` to the user and bump `total_recharge`.
    pub async fn credit(
        &self,
        user_id: UserId,
        amount: Decimal,
        details: &BillingDetails,
    ) -> Result<CommittedMutation, LedgerError> {
        require_positive(amount)?;
        self.mutate(user_id, |current| {
            if current.status == BalanceStatus::Cancelled {
                return Err(LedgerError::Validation(format!(
                    "account {} is CANCELLED",
                    user_id
                )));
            }
            let mut new = current.clone();
            new.dr_balance = current.dr_balance + amount;
            new.total_recharge = current.total_recharge + amount;
            let record = build_record(
                current,
                &new,
                BillType::Recharge,
                amount,
                details,
            );
            Ok((new, record))
        })
        .await
    }

    /// Debit `amount` from the user's available balance.
    ///
    /// `allow_overdraft` is set only when the debit was redirected from a
    /// dependent account to its main account; it is the one path on which
    /// `dr_balance` may go negative.
    pub async fn debit(
        &self,
        user_id: UserId,
        amount: Decimal,
        details: &BillingDetails,
        allow_overdraft: bool,
    ) -> Result<CommittedMutation, LedgerError> {
        require_positive(amount)?;
        self.mutate(user_id, |current| {
            require_normal(current)?;
            let available = current.available();
            if available < amount && !allow_overdraft {
                return Err(LedgerError::InsufficientBalance(format!(
                    "user {}: available {} < amount {}",
                    user_id, available, amount
                )));
            }
            let mut new = current.clone();
            new.dr_balance = current.dr_balance - amount;
            new.total_consume = current.total_consume + amount;
            let record = build_record(current, &new, BillType::Consume, amount, details);
            Ok((new, record))
        })
        .await
    }

    /// Earmark `amount`: move it from `dr_balance` into the pre-deducted
    /// pool. The funds count as consumed from the user's point of view.
    pub async fn reserve(
        &self,
        user_id: UserId,
        amount: Decimal,
        details: &BillingDetails,
    ) -> Result<CommittedMutation, LedgerError> {
        require_positive(amount)?;
        self.mutate(user_id, |current| {
            require_normal(current)?;
            let available = current.available();
            if available < amount {
                return Err(LedgerError::InsufficientBalance(format!(
                    "user {}: available {} < reservation {}",
                    user_id, available, amount
                )));
            }
            let mut new = current.clone();
            new.dr_balance = current.dr_balance - amount;
            new.pre_deducted_balance = current.pre_deducted_balance + amount;
            new.total_consume = current.total_consume + amount;
            let record = build_record(current, &new, BillType::Consume, amount, details)
                .with_extra_data(serde_json::json!({
                    "preDeductedBefore": current.pre_deducted_balance,
                    "preDeductedAfter": new.pre_deducted_balance,
                }));
            Ok((new, record))
        })
        .await
    }

    /// Draw `amount` down from the pre-deducted pool (recurring billing).
    ///
    /// `dr_balance` is untouched: the funds were already consumed when
    /// reserved. The record snapshots the pool instead of the main balance
    /// and is tagged so reconciliation over the main ledger can exclude it.
    pub async fn consume_reservation(
        &self,
        user_id: UserId,
        amount: Decimal,
        details: &BillingDetails,
    ) -> Result<CommittedMutation, LedgerError> {
        require_positive(amount)?;
        self.mutate(user_id, |current| {
            require_normal(current)?;
            if current.pre_deducted_balance < amount {
                return Err(LedgerError::InsufficientBalance(format!(
                    "user {}: pre-deducted {} < amount {}",
                    user_id, current.pre_deducted_balance, amount
                )));
            }
            let mut new = current.clone();
            new.pre_deducted_balance = current.pre_deducted_balance - amount;
            let record = BillingRecord::new(
                current.user_id,
                details.operator_id,
                BillType::Consume,
                details.billing_type,
                &details.business_type,
                details.business_id.as_deref(),
                amount,
                current.pre_deducted_balance,
                new.pre_deducted_balance,
                &details.description,
            )
            .with_extra_data(serde_json::json!({
                "pool": "PRE_DEDUCTED",
                "drBalance": current.dr_balance,
            }));
            let record = match &details.consumer {
                Some(c) => record.with_consumer(c),
                None => record,
            };
            Ok((new, record))
        })
        .await
    }

    /// Return `amount` from the pre-deducted pool to the main balance,
    /// reversing an earlier `reserve`. Counted as a refund.
    pub async fn release_reservation(
        &self,
        user_id: UserId,
        amount: Decimal,
        details: &BillingDetails,
    ) -> Result<CommittedMutation, LedgerError> {
        require_positive(amount)?;
        self.mutate(user_id, |current| {
            if current.pre_deducted_balance < amount {
                return Err(LedgerError::InsufficientBalance(format!(
                    "user {}: pre-deducted {} < release {}",
                    user_id, current.pre_deducted_balance, amount
                )));
            }
            let mut new = current.clone();
            new.dr_balance = current.dr_balance + amount;
            new.pre_deducted_balance = current.pre_deducted_balance - amount;
            new.total_refund = current.total_refund + amount;
            let record = build_record(current, &new, BillType::Refund, amount, details)
                .with_extra_data(serde_json::json!({
                    "preDeductedBefore": current.pre_deducted_balance,
                    "preDeductedAfter": new.pre_deducted_balance,
                }));
            Ok((new, record))
        })
        .await
    }

    /// Credit `amount` back to the main balance as a refund.
    pub async fn refund(
        &self,
        user_id: UserId,
        amount: Decimal,
        details: &BillingDetails,
    ) -> Result<CommittedMutation, LedgerError> {
        require_positive(amount)?;
        self.mutate(user_id, |current| {
            let mut new = current.clone();
            new.dr_balance = current.dr_balance + amount;
            new.total_refund = current.total_refund + amount;
            let record = build_record(current, &new, BillType::Refund, amount, details);
            Ok((new, record))
        })
        .await
    }

    /// Administrative adjustment: signed amount, no balance validation, but
    /// still versioned and still ledgered.
    pub async fn manual_adjust(
        &self,
        user_id: UserId,
        signed_amount: Decimal,
        operator_id: UserId,
        remark: &str,
    ) -> Result<CommittedMutation, LedgerError> {
        if signed_amount.is_zero() {
            return Err(LedgerError::Validation(
                "adjustment amount must be non-zero".to_string(),
            ));
        }
        let remark = truncate_text(remark);
        self.mutate(user_id, |current| {
            let mut new = current.clone();
            new.dr_balance = current.dr_balance + signed_amount;
            let (bill_type, magnitude) = if signed_amount.is_positive() {
                new.total_refund = current.total_refund + signed_amount;
                (BillType::Refund, signed_amount)
            } else {
                new.total_consume = current.total_consume + signed_amount.abs();
                (BillType::Consume, signed_amount.abs())
            };
            let details = BillingDetails::instant(operator_id, "MANUAL_ADJUST", &remark);
            let record = build_record(current, &new, bill_type, magnitude, &details);
            Ok((new, record))
        })
        .await
    }

    /// Read-compute-commit loop with bounded CAS retries.
    async fn mutate<F>(&self, user_id: UserId, compute: F) -> Result<CommittedMutation, LedgerError>
    where
        F: Fn(&UserBalance) -> Result<(UserBalance, BillingRecord), LedgerError>,
    {
        for attempt in 0..=self.max_retries {
            let current = self.get_or_create(user_id).await?;
            let (new, record) = compute(&current)?;
            let bill_no = record.bill_no.clone();
            match self
                .repo
                .commit_balance_mutation(&new, current.version, &record)
                .await?
            {
                Some(bill_id) => {
                    let mut balance = new;
                    balance.version = current.version + 1;
                    return Ok(CommittedMutation {
                        balance,
                        bill_id,
                        bill_no,
                    });
                }
                None => {
                    debug!(
                        user_id = user_id.as_i64(),
                        attempt, "balance version conflict, retrying"
                    );
                }
            }
        }
        Err(LedgerError::ConcurrencyConflict(format!(
            "balance write for user {} conflicted {} times",
            user_id,
            self.max_retries + 1
        )))
    }
}

fn require_positive(amount: Decimal) -> Result<(), LedgerError> {
    if !amount.is_positive() {
        return Err(LedgerError::Validation(format!(
            "amount must be > 0, got {}",
            amount
        )));
    }
    Ok(())
}

fn require_normal(balance: &UserBalance) -> Result<(), LedgerError> {
    if balance.status != BalanceStatus::Normal {
        return Err(LedgerError::Validation(format!(
            "account {} is {}",
            balance.user_id, balance.status
        )));
    }
    Ok(())
}

fn build_record(
    current: &UserBalance,
    new: &UserBalance,
    bill_type: BillType,
    amount: Decimal,
    details: &BillingDetails,
) -> BillingRecord {
    let record = BillingRecord::new(
        current.user_id,
        details.operator_id,
        bill_type,
        details.billing_type,
        &details.business_type,
        details.business_id.as_deref(),
        amount,
        current.dr_balance,
        new.dr_balance,
        &details.description,
    );
    match &details.consumer {
        Some(c) => record.with_consumer(c),
        None => record,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use std::str::FromStr;
    use tempfile::TempDir;

    async fn setup_store() -> (BalanceStore, Arc<Repository>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        let repo = Arc::new(Repository::new(pool));
        (BalanceStore::new(repo.clone(), 3), repo, temp_dir)
    }

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn details() -> BillingDetails {
        BillingDetails::instant(UserId::new(1), "TEST", "test mutation")
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let (store, _repo, _temp) = setup_store().await;
        let a = store.get_or_create(UserId::new(1)).await.unwrap();
        let b = store.get_or_create(UserId::new(1)).await.unwrap();
        assert_eq!(a, b);
        assert!(a.dr_balance.is_zero());
    }

    #[tokio::test]
    async fn test_credit_writes_exactly_one_record() {
        let (store, repo, _temp) = setup_store().await;
        let user = UserId::new(1);

        let committed = store.credit(user, d("100"), &details()).await.unwrap();
        assert_eq!(committed.balance.dr_balance.to_canonical_string(), "100");
        assert_eq!(committed.balance.total_recharge.to_canonical_string(), "100");

        let records = repo.query_billing_records(user, 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].bill_type, BillType::Recharge);
        assert_eq!(records[0].balance_before.to_canonical_string(), "0");
        assert_eq!(records[0].balance_after.to_canonical_string(), "100");
        assert!(records[0].is_consistent());
    }

    #[tokio::test]
    async fn test_credit_rejects_non_positive() {
        let (store, _repo, _temp) = setup_store().await;
        let err = store
            .credit(UserId::new(1), d("0"), &details())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        let err = store
            .credit(UserId::new(1), d("-5"), &details())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[tokio::test]
    async fn test_debit_insufficient_leaves_balance_unchanged() {
        let (store, repo, _temp) = setup_store().await;
        let user = UserId::new(1);
        store.credit(user, d("50"), &details()).await.unwrap();
        let before = store.get_or_create(user).await.unwrap();

        let err = store
            .debit(user, d("80"), &details(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance(_)));

        let after = store.get_or_create(user).await.unwrap();
        assert_eq!(before, after);
        // Only the recharge record exists.
        assert_eq!(repo.query_billing_records(user, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_overdraft_debit_goes_negative() {
        let (store, repo, _temp) = setup_store().await;
        let user = UserId::new(1);
        store.credit(user, d("50"), &details()).await.unwrap();

        let committed = store.debit(user, d("80"), &details(), true).await.unwrap();
        assert_eq!(committed.balance.dr_balance.to_canonical_string(), "-30");

        let records = repo.query_billing_records(user, 10).await.unwrap();
        let debit_record = &records[0];
        assert_eq!(debit_record.amount.to_canonical_string(), "80");
        assert_eq!(debit_record.balance_before.to_canonical_string(), "50");
        assert_eq!(debit_record.balance_after.to_canonical_string(), "-30");
    }

    #[tokio::test]
    async fn test_reserve_moves_to_pre_deducted() {
        let (store, _repo, _temp) = setup_store().await;
        let user = UserId::new(1);
        store.credit(user, d("200"), &details()).await.unwrap();

        let committed = store.reserve(user, d("100"), &details()).await.unwrap();
        assert_eq!(committed.balance.dr_balance.to_canonical_string(), "100");
        assert_eq!(
            committed
                .balance
                .pre_deducted_balance
                .to_canonical_string(),
            "100"
        );
        assert_eq!(committed.balance.total_consume.to_canonical_string(), "100");
    }

    #[tokio::test]
    async fn test_reserve_insufficient() {
        let (store, _repo, _temp) = setup_store().await;
        let user = UserId::new(1);
        store.credit(user, d("50"), &details()).await.unwrap();
        let err = store.reserve(user, d("100"), &details()).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance(_)));
    }

    #[tokio::test]
    async fn test_consume_reservation_draws_down_pool() {
        let (store, repo, _temp) = setup_store().await;
        let user = UserId::new(1);
        store.credit(user, d("200"), &details()).await.unwrap();
        store.reserve(user, d("100"), &details()).await.unwrap();

        let committed = store
            .consume_reservation(user, d("30"), &details())
            .await
            .unwrap();
        assert_eq!(
            committed
                .balance
                .pre_deducted_balance
                .to_canonical_string(),
            "70"
        );
        // Main balance untouched by the drawdown.
        assert_eq!(committed.balance.dr_balance.to_canonical_string(), "100");

        let records = repo.query_billing_records(user, 10).await.unwrap();
        let drawdown = &records[0];
        assert_eq!(drawdown.balance_before.to_canonical_string(), "100");
        assert_eq!(drawdown.balance_after.to_canonical_string(), "70");
        assert_eq!(
            drawdown.extra_data.as_ref().unwrap()["pool"],
            serde_json::json!("PRE_DEDUCTED")
        );
    }

    #[tokio::test]
    async fn test_consume_reservation_cannot_overdraw_pool() {
        let (store, _repo, _temp) = setup_store().await;
        let user = UserId::new(1);
        store.credit(user, d("200"), &details()).await.unwrap();
        store.reserve(user, d("50"), &details()).await.unwrap();

        let err = store
            .consume_reservation(user, d("60"), &details())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance(_)));
    }

    #[tokio::test]
    async fn test_release_reservation_returns_pool_to_main() {
        let (store, repo, _temp) = setup_store().await;
        let user = UserId::new(1);
        store.credit(user, d("200"), &details()).await.unwrap();
        store.reserve(user, d("100"), &details()).await.unwrap();

        let committed = store
            .release_reservation(user, d("100"), &details())
            .await
            .unwrap();
        assert_eq!(committed.balance.dr_balance.to_canonical_string(), "200");
        assert!(committed.balance.pre_deducted_balance.is_zero());
        assert_eq!(committed.balance.total_refund.to_canonical_string(), "100");

        let records = repo.query_billing_records(user, 10).await.unwrap();
        assert_eq!(records[0].bill_type, BillType::Refund);
        assert_eq!(records[0].balance_after.to_canonical_string(), "200");
    }

    #[tokio::test]
    async fn test_release_reservation_cannot_exceed_pool() {
        let (store, _repo, _temp) = setup_store().await;
        let user = UserId::new(1);
        store.credit(user, d("200"), &details()).await.unwrap();
        store.reserve(user, d("50"), &details()).await.unwrap();

        let err = store
            .release_reservation(user, d("60"), &details())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance(_)));
    }

    #[tokio::test]
    async fn test_refund_credits_main_balance() {
        let (store, repo, _temp) = setup_store().await;
        let user = UserId::new(1);
        store.credit(user, d("100"), &details()).await.unwrap();
        store.debit(user, d("40"), &details(), false).await.unwrap();

        let committed = store.refund(user, d("40"), &details()).await.unwrap();
        assert_eq!(committed.balance.dr_balance.to_canonical_string(), "100");
        assert_eq!(committed.balance.total_refund.to_canonical_string(), "40");

        let records = repo.query_billing_records(user, 10).await.unwrap();
        assert_eq!(records[0].bill_type, BillType::Refund);
    }

    #[tokio::test]
    async fn test_manual_adjust_bypasses_validation() {
        let (store, repo, _temp) = setup_store().await;
        let user = UserId::new(1);

        // Negative adjustment on an empty account: allowed, goes negative.
        let committed = store
            .manual_adjust(user, d("-40"), UserId::new(99), "correction")
            .await
            .unwrap();
        assert_eq!(committed.balance.dr_balance.to_canonical_string(), "-40");
        assert_eq!(committed.balance.total_consume.to_canonical_string(), "40");

        let committed = store
            .manual_adjust(user, d("15"), UserId::new(99), "compensation")
            .await
            .unwrap();
        assert_eq!(committed.balance.dr_balance.to_canonical_string(), "-25");
        assert_eq!(committed.balance.total_refund.to_canonical_string(), "15");

        let records = repo.query_billing_records(user, 10).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].bill_type, BillType::Refund);
        assert_eq!(records[1].bill_type, BillType::Consume);
    }

    #[tokio::test]
    async fn test_every_mutation_increments_version() {
        let (store, _repo, _temp) = setup_store().await;
        let user = UserId::new(1);

        let c1 = store.credit(user, d("10"), &details()).await.unwrap();
        assert_eq!(c1.balance.version, 1);
        let c2 = store.debit(user, d("5"), &details(), false).await.unwrap();
        assert_eq!(c2.balance.version, 2);
    }

    #[tokio::test]
    async fn test_reconciliation_of_counters_and_history() {
        let (store, repo, _temp) = setup_store().await;
        let user = UserId::new(1);

        store.credit(user, d("1000"), &details()).await.unwrap();
        store.debit(user, d("300"), &details(), false).await.unwrap();
        store
            .manual_adjust(user, d("50"), UserId::new(99), "refund")
            .await
            .unwrap();
        store.reserve(user, d("100"), &details()).await.unwrap();
        store
            .consume_reservation(user, d("40"), &details())
            .await
            .unwrap();

        let balance = store.get_or_create(user).await.unwrap();
        let records = repo.query_billing_records(user, 50).await.unwrap();

        // Net of the main-balance ledger (pool drawdowns excluded) must equal
        // totalRecharge - totalConsume + totalRefund.
        let net: Decimal = records
            .iter()
            .filter(|r| {
                r.extra_data
                    .as_ref()
                    .map(|e| e["pool"] != serde_json::json!("PRE_DEDUCTED"))
                    .unwrap_or(true)
            })
            .fold(Decimal::zero(), |acc, r| acc + r.signed_amount());

        let expected = balance.total_recharge - balance.total_consume + balance.total_refund;
        assert_eq!(net, expected);
    }
}
