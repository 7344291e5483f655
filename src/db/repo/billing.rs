//! Append-only billing record operations.

use crate::domain::{BillNo, BillType, BillingRecord, BillingType, UserId};
use sqlx::{Row, Sqlite, Transaction};

use super::{decimal_col, Repository};

/// Insert a billing record inside an open transaction.
///
/// Only the balance/commission transactions call this; records never exist
/// without the balance write they describe.
pub(super) async fn insert_record_tx(
    tx: &mut Transaction<'_, Sqlite>,
    record: &BillingRecord,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO billing_record (
            bill_no, user_id, operator_id, bill_type, billing_type,
            business_type, business_id, amount, balance_before, balance_after,
            description, extra_data, consumer, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.bill_no.as_str())
    .bind(record.user_id.as_i64())
    .bind(record.operator_id.as_i64())
    .bind(record.bill_type.as_str())
    .bind(record.billing_type.as_str())
    .bind(record.business_type.as_str())
    .bind(record.business_id.as_deref())
    .bind(record.amount.to_canonical_string())
    .bind(record.balance_before.to_canonical_string())
    .bind(record.balance_after.to_canonical_string())
    .bind(record.description.as_str())
    .bind(record.extra_data.as_ref().map(|v| v.to_string()))
    .bind(record.consumer.as_deref())
    .bind(chrono::Utc::now().timestamp_millis())
    .execute(&mut **tx)
    .await?;

    Ok(result.last_insert_rowid())
}

impl Repository {
    /// Query a user's billing history, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query_billing_records(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<BillingRecord>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT bill_id, bill_no, user_id, operator_id, bill_type, billing_type,
                   business_type, business_id, amount, balance_before, balance_after,
                   description, extra_data, consumer
            FROM billing_record
            WHERE user_id = ?
            ORDER BY bill_id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id.as_i64())
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.iter().map(row_to_record).collect())
    }

    /// Look up a single record by its unique bill number.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_record_by_bill_no(
        &self,
        bill_no: &BillNo,
    ) -> Result<Option<BillingRecord>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT bill_id, bill_no, user_id, operator_id, bill_type, billing_type,
                   business_type, business_id, amount, balance_before, balance_after,
                   description, extra_data, consumer
            FROM billing_record
            WHERE bill_no = ?
            "#,
        )
        .bind(bill_no.as_str())
        .fetch_optional(self.pool())
        .await?;

        Ok(row.as_ref().map(row_to_record))
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> BillingRecord {
    let bill_type_str: String = row.get("bill_type");
    let billing_type_str: String = row.get("billing_type");
    let extra_data_str: Option<String> = row.get("extra_data");

    BillingRecord {
        bill_id: row.get("bill_id"),
        bill_no: BillNo::new(row.get("bill_no")),
        user_id: UserId::new(row.get("user_id")),
        operator_id: UserId::new(row.get("operator_id")),
        bill_type: BillType::parse(&bill_type_str).unwrap_or(BillType::Consume),
        billing_type: BillingType::parse(&billing_type_str).unwrap_or(BillingType::Instant),
        business_type: row.get("business_type"),
        business_id: row.get("business_id"),
        amount: decimal_col(row, "amount"),
        balance_before: decimal_col(row, "balance_before"),
        balance_after: decimal_col(row, "balance_after"),
        description: row.get("description"),
        extra_data: extra_data_str.and_then(|s| serde_json::from_str(&s).ok()),
        consumer: row.get("consumer"),
    }
}
