//! Billable resource operations for the daily tick.

use crate::domain::{BillableResource, Decimal, ResourceId, ResourceStatus, UserId};
use chrono::NaiveDate;
use sqlx::Row;

use super::{decimal_col, Repository};

impl Repository {
    /// Register a resource for daily billing. Idempotent.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn register_resource(
        &self,
        resource: &BillableResource,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO billable_resource (
                resource_id, owner_user_id, business_type, status,
                total_billed_days, total_billed_amount, last_billed_day, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(resource_id) DO NOTHING
            "#,
        )
        .bind(resource.resource_id.as_str())
        .bind(resource.owner_user_id.as_i64())
        .bind(resource.business_type.as_str())
        .bind(resource.status.as_str())
        .bind(resource.total_billed_days)
        .bind(resource.total_billed_amount.to_canonical_string())
        .bind(resource.last_billed_day.map(|d| d.to_string()))
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Resources that still need a charge for `day`: ACTIVE and not yet
    /// billed on that calendar day.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_due_resources(
        &self,
        day: NaiveDate,
    ) -> Result<Vec<BillableResource>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT resource_id, owner_user_id, business_type, status,
                   total_billed_days, total_billed_amount, last_billed_day
            FROM billable_resource
            WHERE status = 'ACTIVE'
              AND (last_billed_day IS NULL OR last_billed_day < ?)
            ORDER BY resource_id ASC
            "#,
        )
        .bind(day.to_string())
        .fetch_all(self.pool())
        .await?;

        Ok(rows.iter().map(row_to_resource).collect())
    }

    /// Record that a resource was charged for `day`.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub async fn mark_resource_billed(
        &self,
        resource_id: &ResourceId,
        day: NaiveDate,
        new_total_amount: Decimal,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE billable_resource
            SET total_billed_days = total_billed_days + 1,
                total_billed_amount = ?,
                last_billed_day = ?
            WHERE resource_id = ?
            "#,
        )
        .bind(new_total_amount.to_canonical_string())
        .bind(day.to_string())
        .bind(resource_id.as_str())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Change a resource's billing status (e.g. STOPPED when released).
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub async fn set_resource_status(
        &self,
        resource_id: &ResourceId,
        status: ResourceStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE billable_resource SET status = ? WHERE resource_id = ?")
            .bind(status.as_str())
            .bind(resource_id.as_str())
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Fetch a resource row.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_resource(
        &self,
        resource_id: &ResourceId,
    ) -> Result<Option<BillableResource>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT resource_id, owner_user_id, business_type, status,
                   total_billed_days, total_billed_amount, last_billed_day
            FROM billable_resource
            WHERE resource_id = ?
            "#,
        )
        .bind(resource_id.as_str())
        .fetch_optional(self.pool())
        .await?;

        Ok(row.as_ref().map(row_to_resource))
    }
}

fn row_to_resource(row: &sqlx::sqlite::SqliteRow) -> BillableResource {
    let status_str: String = row.get("status");
    let last_billed_day: Option<String> = row.get("last_billed_day");

    BillableResource {
        resource_id: ResourceId::new(row.get("resource_id")),
        owner_user_id: UserId::new(row.get("owner_user_id")),
        business_type: row.get("business_type"),
        status: ResourceStatus::parse(&status_str).unwrap_or(ResourceStatus::Stopped),
        total_billed_days: row.get("total_billed_days"),
        total_billed_amount: decimal_col(row, "total_billed_amount"),
        last_billed_day: last_billed_day.and_then(|s| s.parse().ok()),
    }
}
