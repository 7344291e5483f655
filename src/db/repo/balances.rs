//! Balance row operations and the compare-and-swap mutation transaction.

use crate::domain::{BalanceStatus, BillingRecord, UserBalance, UserId};
use sqlx::Row;

use super::{billing, decimal_col, Repository};

impl Repository {
    /// Fetch a balance row.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_balance(&self, user_id: UserId) -> Result<Option<UserBalance>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT user_id, dr_balance, pre_deducted_balance, frozen_amount,
                   total_recharge, total_consume, total_refund, version, status
            FROM user_balance
            WHERE user_id = ?
            "#,
        )
        .bind(user_id.as_i64())
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|r| row_to_balance(&r)))
    }

    /// Insert a zero balance row if the user has none yet.
    ///
    /// Returns true if a row was created. Safe to race: the second writer's
    /// insert is a no-op.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_balance_if_absent(
        &self,
        balance: &UserBalance,
    ) -> Result<bool, sqlx::Error> {
        let now = chrono::Utc::now().timestamp_millis();
        let result = sqlx::query(
            r#"
            INSERT INTO user_balance (
                user_id, dr_balance, pre_deducted_balance, frozen_amount,
                total_recharge, total_consume, total_refund, version, status,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO NOTHING
            "#,
        )
        .bind(balance.user_id.as_i64())
        .bind(balance.dr_balance.to_canonical_string())
        .bind(balance.pre_deducted_balance.to_canonical_string())
        .bind(balance.frozen_amount.to_canonical_string())
        .bind(balance.total_recharge.to_canonical_string())
        .bind(balance.total_consume.to_canonical_string())
        .bind(balance.total_refund.to_canonical_string())
        .bind(balance.version)
        .bind(balance.status.as_str())
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Commit a balance mutation and its billing record atomically.
    ///
    /// The balance write is guarded by `WHERE version = expected_version`;
    /// on a version mismatch nothing is written and `Ok(None)` is returned so
    /// the caller can re-read and retry. On success returns the inserted
    /// billing record's `bill_id`.
    ///
    /// # Errors
    /// Returns an error if the transaction fails; the balance write and the
    /// record insert stand or fall together.
    pub async fn commit_balance_mutation(
        &self,
        new: &UserBalance,
        expected_version: i64,
        record: &BillingRecord,
    ) -> Result<Option<i64>, sqlx::Error> {
        let mut tx = self.pool().begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE user_balance
            SET dr_balance = ?, pre_deducted_balance = ?, frozen_amount = ?,
                total_recharge = ?, total_consume = ?, total_refund = ?,
                status = ?, version = version + 1, updated_at = ?
            WHERE user_id = ? AND version = ?
            "#,
        )
        .bind(new.dr_balance.to_canonical_string())
        .bind(new.pre_deducted_balance.to_canonical_string())
        .bind(new.frozen_amount.to_canonical_string())
        .bind(new.total_recharge.to_canonical_string())
        .bind(new.total_consume.to_canonical_string())
        .bind(new.total_refund.to_canonical_string())
        .bind(new.status.as_str())
        .bind(chrono::Utc::now().timestamp_millis())
        .bind(new.user_id.as_i64())
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let bill_id = billing::insert_record_tx(&mut tx, record).await?;
        tx.commit().await?;
        Ok(Some(bill_id))
    }
}

pub(super) fn row_to_balance(row: &sqlx::sqlite::SqliteRow) -> UserBalance {
    let status_str: String = row.get("status");
    UserBalance {
        user_id: UserId::new(row.get("user_id")),
        dr_balance: decimal_col(row, "dr_balance"),
        pre_deducted_balance: decimal_col(row, "pre_deducted_balance"),
        frozen_amount: decimal_col(row, "frozen_amount"),
        total_recharge: decimal_col(row, "total_recharge"),
        total_consume: decimal_col(row, "total_consume"),
        total_refund: decimal_col(row, "total_refund"),
        version: row.get("version"),
        status: BalanceStatus::parse(&status_str).unwrap_or(BalanceStatus::Normal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::domain::{BillType, BillingType, Decimal};
    use std::str::FromStr;
    use tempfile::TempDir;

    async fn setup_test_db() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }

    fn recharge_record(user_id: UserId, amount: &str, before: &str, after: &str) -> BillingRecord {
        BillingRecord::new(
            user_id,
            user_id,
            BillType::Recharge,
            BillingType::Instant,
            "RECHARGE",
            None,
            Decimal::from_str(amount).unwrap(),
            Decimal::from_str(before).unwrap(),
            Decimal::from_str(after).unwrap(),
            "test recharge",
        )
    }

    #[tokio::test]
    async fn test_insert_balance_if_absent_is_idempotent() {
        let (repo, _temp) = setup_test_db().await;
        let balance = UserBalance::new_zero(UserId::new(1));

        assert!(repo.insert_balance_if_absent(&balance).await.unwrap());
        assert!(!repo.insert_balance_if_absent(&balance).await.unwrap());

        let fetched = repo.get_balance(UserId::new(1)).await.unwrap().unwrap();
        assert_eq!(fetched, balance);
    }

    #[tokio::test]
    async fn test_commit_balance_mutation_success() {
        let (repo, _temp) = setup_test_db().await;
        let user_id = UserId::new(1);
        let balance = UserBalance::new_zero(user_id);
        repo.insert_balance_if_absent(&balance).await.unwrap();

        let mut new = balance.clone();
        new.dr_balance = Decimal::from_str("100").unwrap();
        new.total_recharge = Decimal::from_str("100").unwrap();

        let record = recharge_record(user_id, "100", "0", "100");
        let bill_id = repo
            .commit_balance_mutation(&new, 0, &record)
            .await
            .unwrap();
        assert!(bill_id.is_some());

        let fetched = repo.get_balance(user_id).await.unwrap().unwrap();
        assert_eq!(fetched.dr_balance.to_canonical_string(), "100");
        assert_eq!(fetched.version, 1);
    }

    #[tokio::test]
    async fn test_commit_balance_mutation_version_conflict() {
        let (repo, _temp) = setup_test_db().await;
        let user_id = UserId::new(1);
        let balance = UserBalance::new_zero(user_id);
        repo.insert_balance_if_absent(&balance).await.unwrap();

        let mut new = balance.clone();
        new.dr_balance = Decimal::from_str("100").unwrap();

        let record = recharge_record(user_id, "100", "0", "100");
        // Stale expected version: nothing must change.
        let result = repo
            .commit_balance_mutation(&new, 7, &record)
            .await
            .unwrap();
        assert!(result.is_none());

        let fetched = repo.get_balance(user_id).await.unwrap().unwrap();
        assert!(fetched.dr_balance.is_zero());
        assert_eq!(fetched.version, 0);

        // The billing record must not have been committed either.
        let records = repo.query_billing_records(user_id, 10).await.unwrap();
        assert!(records.is_empty());
    }
}
