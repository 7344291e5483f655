//! Commission account and accrual operations.

use crate::domain::{BillNo, CommissionAccount, CommissionEntry, Decimal, UserId};
use sqlx::Row;

use super::{decimal_col, AccrualOutcome, Repository};

impl Repository {
    /// Fetch a commission account row.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_commission_account(
        &self,
        agent_user_id: UserId,
    ) -> Result<Option<CommissionAccount>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT agent_user_id, total_commission, settled_commission, version
            FROM commission_account
            WHERE agent_user_id = ?
            "#,
        )
        .bind(agent_user_id.as_i64())
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|r| row_to_account(&r)))
    }

    /// Insert a zero commission account if the agent has none yet.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_commission_account_if_absent(
        &self,
        account: &CommissionAccount,
    ) -> Result<bool, sqlx::Error> {
        let now = chrono::Utc::now().timestamp_millis();
        let result = sqlx::query(
            r#"
            INSERT INTO commission_account (
                agent_user_id, total_commission, settled_commission, version,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(agent_user_id) DO NOTHING
            "#,
        )
        .bind(account.agent_user_id.as_i64())
        .bind(account.total_commission.to_canonical_string())
        .bind(account.settled_commission.to_canonical_string())
        .bind(account.version)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Apply one per-level accrual atomically.
    ///
    /// The transaction first claims the `(bill_id, level)` idempotency key;
    /// if the key already exists the account is left untouched
    /// (`AlreadyApplied`). Otherwise the account's total is moved to
    /// `new_total` under the version guard; a stale version rolls the key
    /// claim back too (`VersionConflict`), so a retry starts clean.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn apply_accrual(
        &self,
        entry: &CommissionEntry,
        expected_version: i64,
        new_total: Decimal,
    ) -> Result<AccrualOutcome, sqlx::Error> {
        let mut tx = self.pool().begin().await?;

        let claimed = sqlx::query(
            r#"
            INSERT INTO commission_accrual (
                bill_id, level, bill_no, agent_user_id, buyer_user_id,
                rate, recharge_amount, commission_amount, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bill_id, level) DO NOTHING
            "#,
        )
        .bind(entry.bill_id)
        .bind(entry.level as i64)
        .bind(entry.bill_no.as_str())
        .bind(entry.agent_user_id.as_i64())
        .bind(entry.buyer_user_id.as_i64())
        .bind(entry.rate.to_canonical_string())
        .bind(entry.recharge_amount.to_canonical_string())
        .bind(entry.commission_amount.to_canonical_string())
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(AccrualOutcome::AlreadyApplied);
        }

        let updated = sqlx::query(
            r#"
            UPDATE commission_account
            SET total_commission = ?, version = version + 1, updated_at = ?
            WHERE agent_user_id = ? AND version = ?
            "#,
        )
        .bind(new_total.to_canonical_string())
        .bind(chrono::Utc::now().timestamp_millis())
        .bind(entry.agent_user_id.as_i64())
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(AccrualOutcome::VersionConflict);
        }

        tx.commit().await?;
        Ok(AccrualOutcome::Applied)
    }

    /// Query an agent's accrual history, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query_commission_entries(
        &self,
        agent_user_id: UserId,
        limit: i64,
    ) -> Result<Vec<CommissionEntry>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT bill_id, level, bill_no, agent_user_id, buyer_user_id,
                   rate, recharge_amount, commission_amount
            FROM commission_accrual
            WHERE agent_user_id = ?
            ORDER BY accrual_id DESC
            LIMIT ?
            "#,
        )
        .bind(agent_user_id.as_i64())
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let level: i64 = row.get("level");
                CommissionEntry {
                    agent_user_id: UserId::new(row.get("agent_user_id")),
                    buyer_user_id: UserId::new(row.get("buyer_user_id")),
                    bill_id: row.get("bill_id"),
                    bill_no: BillNo::new(row.get("bill_no")),
                    level: level as u8,
                    rate: decimal_col(row, "rate"),
                    recharge_amount: decimal_col(row, "recharge_amount"),
                    commission_amount: decimal_col(row, "commission_amount"),
                }
            })
            .collect())
    }
}

pub(super) fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> CommissionAccount {
    CommissionAccount {
        agent_user_id: UserId::new(row.get("agent_user_id")),
        total_commission: decimal_col(row, "total_commission"),
        settled_commission: decimal_col(row, "settled_commission"),
        version: row.get("version"),
    }
}
