//! Settlement rows and their guarded state transitions.

use crate::domain::{CommissionSettlement, Decimal, SettlementStatus, UserId};
use chrono::{TimeZone, Utc};
use sqlx::Row;
use std::str::FromStr;

use super::{decimal_col, opt_decimal_col, ApplyOutcome, Repository, TransitionOutcome};

impl Repository {
    /// Create a PENDING settlement, reserving the requested amount.
    ///
    /// The transaction bumps the commission account version first; that CAS
    /// serializes concurrent appliers for the same agent, so the subsequent
    /// reads of the account totals and of already-PENDING requests are
    /// stable. The insert only happens when
    /// `requested + sum(PENDING) <= total - settled`.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn apply_settlement(
        &self,
        settlement: &CommissionSettlement,
        expected_version: i64,
    ) -> Result<ApplyOutcome, sqlx::Error> {
        let agent_id = settlement.agent_user_id.as_i64();
        let mut tx = self.pool().begin().await?;

        let bumped = sqlx::query(
            r#"
            UPDATE commission_account
            SET version = version + 1, updated_at = ?
            WHERE agent_user_id = ? AND version = ?
            "#,
        )
        .bind(Utc::now().timestamp_millis())
        .bind(agent_id)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if bumped.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(ApplyOutcome::VersionConflict);
        }

        let account_row = sqlx::query(
            "SELECT total_commission, settled_commission FROM commission_account WHERE agent_user_id = ?",
        )
        .bind(agent_id)
        .fetch_one(&mut *tx)
        .await?;
        let total = decimal_col(&account_row, "total_commission");
        let settled = decimal_col(&account_row, "settled_commission");
        let available = total - settled;

        let pending_rows = sqlx::query(
            "SELECT requested_amount FROM commission_settlement WHERE agent_user_id = ? AND status = 'PENDING'",
        )
        .bind(agent_id)
        .fetch_all(&mut *tx)
        .await?;
        let mut pending = Decimal::zero();
        for row in &pending_rows {
            let amount: String = row.get("requested_amount");
            pending = pending + Decimal::from_str(&amount).unwrap_or_default();
        }

        if settlement.requested_amount + pending > available {
            tx.rollback().await?;
            return Ok(ApplyOutcome::ExceedsAvailable { available, pending });
        }

        let now = Utc::now().timestamp_millis();
        let inserted = sqlx::query(
            r#"
            INSERT INTO commission_settlement (
                agent_user_id, requested_amount, remark, network, address,
                status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, 'PENDING', ?, ?)
            "#,
        )
        .bind(agent_id)
        .bind(settlement.requested_amount.to_canonical_string())
        .bind(settlement.remark.as_deref())
        .bind(settlement.network.as_str())
        .bind(settlement.address.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let settlement_id = inserted.last_insert_rowid();
        tx.commit().await?;
        Ok(ApplyOutcome::Applied(settlement_id))
    }

    /// Approve a PENDING settlement and move `settled_commission` up.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    #[allow(clippy::too_many_arguments)]
    pub async fn approve_settlement(
        &self,
        settlement_id: i64,
        agent_user_id: UserId,
        approved_amount: Decimal,
        operator_id: UserId,
        remark: Option<&str>,
        expected_version: i64,
        new_settled: Decimal,
    ) -> Result<TransitionOutcome, sqlx::Error> {
        let mut tx = self.pool().begin().await?;

        let transitioned = sqlx::query(
            r#"
            UPDATE commission_settlement
            SET status = 'APPROVED', approved_amount = ?, operator_id = ?,
                remark = COALESCE(?, remark), updated_at = ?
            WHERE settlement_id = ? AND status = 'PENDING'
            "#,
        )
        .bind(approved_amount.to_canonical_string())
        .bind(operator_id.as_i64())
        .bind(remark)
        .bind(Utc::now().timestamp_millis())
        .bind(settlement_id)
        .execute(&mut *tx)
        .await?;

        if transitioned.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(TransitionOutcome::NotPending);
        }

        let updated = sqlx::query(
            r#"
            UPDATE commission_account
            SET settled_commission = ?, version = version + 1, updated_at = ?
            WHERE agent_user_id = ? AND version = ?
            "#,
        )
        .bind(new_settled.to_canonical_string())
        .bind(Utc::now().timestamp_millis())
        .bind(agent_user_id.as_i64())
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(TransitionOutcome::VersionConflict);
        }

        tx.commit().await?;
        Ok(TransitionOutcome::Done)
    }

    /// Move a PENDING settlement to REJECTED or CANCELLED. No balance effect;
    /// the reservation is released simply by the row leaving PENDING.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub async fn finalize_settlement(
        &self,
        settlement_id: i64,
        status: SettlementStatus,
        operator_id: UserId,
        remark: Option<&str>,
    ) -> Result<TransitionOutcome, sqlx::Error> {
        debug_assert!(matches!(
            status,
            SettlementStatus::Rejected | SettlementStatus::Cancelled
        ));

        let result = sqlx::query(
            r#"
            UPDATE commission_settlement
            SET status = ?, operator_id = ?, remark = COALESCE(?, remark), updated_at = ?
            WHERE settlement_id = ? AND status = 'PENDING'
            "#,
        )
        .bind(status.as_str())
        .bind(operator_id.as_i64())
        .bind(remark)
        .bind(Utc::now().timestamp_millis())
        .bind(settlement_id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            Ok(TransitionOutcome::NotPending)
        } else {
            Ok(TransitionOutcome::Done)
        }
    }

    /// Fetch a settlement by id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_settlement(
        &self,
        settlement_id: i64,
    ) -> Result<Option<CommissionSettlement>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT settlement_id, agent_user_id, requested_amount, approved_amount,
                   operator_id, remark, network, address, status, created_at, updated_at
            FROM commission_settlement
            WHERE settlement_id = ?
            "#,
        )
        .bind(settlement_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.as_ref().map(row_to_settlement))
    }

    /// List an agent's settlements, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_settlements(
        &self,
        agent_user_id: UserId,
        limit: i64,
    ) -> Result<Vec<CommissionSettlement>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT settlement_id, agent_user_id, requested_amount, approved_amount,
                   operator_id, remark, network, address, status, created_at, updated_at
            FROM commission_settlement
            WHERE agent_user_id = ?
            ORDER BY settlement_id DESC
            LIMIT ?
            "#,
        )
        .bind(agent_user_id.as_i64())
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.iter().map(row_to_settlement).collect())
    }
}

fn row_to_settlement(row: &sqlx::sqlite::SqliteRow) -> CommissionSettlement {
    let status_str: String = row.get("status");
    let operator_id: Option<i64> = row.get("operator_id");
    let created_at: i64 = row.get("created_at");
    let updated_at: i64 = row.get("updated_at");

    CommissionSettlement {
        settlement_id: row.get("settlement_id"),
        agent_user_id: UserId::new(row.get("agent_user_id")),
        requested_amount: decimal_col(row, "requested_amount"),
        approved_amount: opt_decimal_col(row, "approved_amount"),
        operator_id: operator_id.map(UserId::new),
        remark: row.get("remark"),
        network: row.get("network"),
        address: row.get("address"),
        status: SettlementStatus::parse(&status_str).unwrap_or(SettlementStatus::Pending),
        created_at: Utc.timestamp_millis_opt(created_at).single().unwrap_or_default(),
        updated_at: Utc.timestamp_millis_opt(updated_at).single().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::domain::CommissionAccount;
    use tempfile::TempDir;

    async fn setup_agent(total: &str) -> (Repository, TempDir, UserId) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        let repo = Repository::new(pool);

        let agent = UserId::new(9);
        let mut account = CommissionAccount::new_zero(agent);
        account.total_commission = Decimal::from_str(total).unwrap();
        repo.insert_commission_account_if_absent(&account)
            .await
            .unwrap();
        (repo, temp_dir, agent)
    }

    fn pending(agent: UserId, amount: &str) -> CommissionSettlement {
        CommissionSettlement::new_pending(
            agent,
            Decimal::from_str(amount).unwrap(),
            "TRC20".to_string(),
            "Taddr".to_string(),
            None,
        )
    }

    #[tokio::test]
    async fn test_apply_settlement_within_available() {
        let (repo, _temp, agent) = setup_agent("500").await;

        let outcome = repo
            .apply_settlement(&pending(agent, "200"), 0)
            .await
            .unwrap();
        assert!(matches!(outcome, ApplyOutcome::Applied(_)));

        let listed = repo.list_settlements(agent, 10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, SettlementStatus::Pending);
        assert_eq!(listed[0].requested_amount.to_canonical_string(), "200");
    }

    #[tokio::test]
    async fn test_apply_settlement_reserves_pending_amounts() {
        let (repo, _temp, agent) = setup_agent("500").await;

        let outcome = repo
            .apply_settlement(&pending(agent, "400"), 0)
            .await
            .unwrap();
        assert!(matches!(outcome, ApplyOutcome::Applied(_)));

        // 400 of 500 is already reserved by the first PENDING request.
        let outcome = repo
            .apply_settlement(&pending(agent, "200"), 1)
            .await
            .unwrap();
        match outcome {
            ApplyOutcome::ExceedsAvailable { available, pending } => {
                assert_eq!(available.to_canonical_string(), "500");
                assert_eq!(pending.to_canonical_string(), "400");
            }
            other => panic!("expected ExceedsAvailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_apply_settlement_stale_version() {
        let (repo, _temp, agent) = setup_agent("500").await;
        let outcome = repo
            .apply_settlement(&pending(agent, "100"), 3)
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::VersionConflict);
        assert!(repo.list_settlements(agent, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_approve_requires_pending() {
        let (repo, _temp, agent) = setup_agent("500").await;
        let id = match repo
            .apply_settlement(&pending(agent, "100"), 0)
            .await
            .unwrap()
        {
            ApplyOutcome::Applied(id) => id,
            other => panic!("apply failed: {:?}", other),
        };

        let account = repo.get_commission_account(agent).await.unwrap().unwrap();
        let outcome = repo
            .approve_settlement(
                id,
                agent,
                Decimal::from_str("100").unwrap(),
                UserId::new(1),
                Some("ok"),
                account.version,
                Decimal::from_str("100").unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(outcome, TransitionOutcome::Done);

        // Second approval attempt must see a non-PENDING row.
        let account = repo.get_commission_account(agent).await.unwrap().unwrap();
        let outcome = repo
            .approve_settlement(
                id,
                agent,
                Decimal::from_str("100").unwrap(),
                UserId::new(1),
                None,
                account.version,
                Decimal::from_str("200").unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(outcome, TransitionOutcome::NotPending);

        let settlement = repo.get_settlement(id).await.unwrap().unwrap();
        assert_eq!(settlement.status, SettlementStatus::Approved);
        assert_eq!(
            settlement.approved_amount.unwrap().to_canonical_string(),
            "100"
        );
    }

    #[tokio::test]
    async fn test_finalize_rejected_releases_reservation() {
        let (repo, _temp, agent) = setup_agent("500").await;
        let id = match repo
            .apply_settlement(&pending(agent, "500"), 0)
            .await
            .unwrap()
        {
            ApplyOutcome::Applied(id) => id,
            other => panic!("apply failed: {:?}", other),
        };

        let outcome = repo
            .finalize_settlement(id, SettlementStatus::Rejected, UserId::new(1), Some("no"))
            .await
            .unwrap();
        assert_eq!(outcome, TransitionOutcome::Done);

        // The full amount is requestable again.
        let account = repo.get_commission_account(agent).await.unwrap().unwrap();
        let outcome = repo
            .apply_settlement(&pending(agent, "500"), account.version)
            .await
            .unwrap();
        assert!(matches!(outcome, ApplyOutcome::Applied(_)));
    }

    #[tokio::test]
    async fn test_finalize_terminal_is_not_pending() {
        let (repo, _temp, agent) = setup_agent("500").await;
        let id = match repo
            .apply_settlement(&pending(agent, "100"), 0)
            .await
            .unwrap()
        {
            ApplyOutcome::Applied(id) => id,
            other => panic!("apply failed: {:?}", other),
        };

        repo.finalize_settlement(id, SettlementStatus::Cancelled, UserId::new(9), None)
            .await
            .unwrap();
        let outcome = repo
            .finalize_settlement(id, SettlementStatus::Rejected, UserId::new(1), None)
            .await
            .unwrap();
        assert_eq!(outcome, TransitionOutcome::NotPending);
    }
}
