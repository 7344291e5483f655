//! Price catalog operations.

use crate::domain::{BillingType, PriceConfig, PriceStatus};
use sqlx::Row;

use super::{decimal_col, Repository};

impl Repository {
    /// Fetch the price config for a business type.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_price_config(
        &self,
        business_type: &str,
    ) -> Result<Option<PriceConfig>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT business_type, business_name, price_unit, dr_price, billing_type, status
            FROM price_config
            WHERE business_type = ?
            "#,
        )
        .bind(business_type)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.as_ref().map(row_to_price))
    }

    /// Insert or replace a price config row.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub async fn upsert_price_config(&self, config: &PriceConfig) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO price_config (business_type, business_name, price_unit, dr_price, billing_type, status)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(business_type) DO UPDATE SET
                business_name = excluded.business_name,
                price_unit = excluded.price_unit,
                dr_price = excluded.dr_price,
                billing_type = excluded.billing_type,
                status = excluded.status
            "#,
        )
        .bind(config.business_type.as_str())
        .bind(config.business_name.as_str())
        .bind(config.price_unit.as_str())
        .bind(config.dr_price.to_canonical_string())
        .bind(config.billing_type.as_str())
        .bind(config.status.as_str())
        .execute(self.pool())
        .await?;

        Ok(())
    }
}

fn row_to_price(row: &sqlx::sqlite::SqliteRow) -> PriceConfig {
    let billing_type_str: String = row.get("billing_type");
    let status_str: String = row.get("status");
    PriceConfig {
        business_type: row.get("business_type"),
        business_name: row.get("business_name"),
        price_unit: row.get("price_unit"),
        dr_price: decimal_col(row, "dr_price"),
        billing_type: BillingType::parse(&billing_type_str).unwrap_or(BillingType::Instant),
        status: PriceStatus::parse(&status_str).unwrap_or(PriceStatus::Inactive),
    }
}
