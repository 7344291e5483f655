//! Reservation and recurring billing for marketing instances.
//!
//! Creating an instance reserves a fixed pre-deduction and charges a prorated
//! first day; afterwards the daily tick charges each ACTIVE resource one
//! `dr_price` per calendar day, drawing the pre-deducted pool down first and
//! falling back to the owner's main balance once the pool is empty.

use crate::db::Repository;
use crate::domain::{
    BillableResource, BillingType, Decimal, PriceConfig, ResourceId, ResourceStatus, UserBalance,
    UserId, BUSINESS_INSTANCE_MARKETING, BUSINESS_INSTANCE_PRE_DEDUCT,
};
use crate::engine::balance_store::{BalanceStore, BillingDetails};
use crate::error::LedgerError;
use crate::hierarchy::OrgDirectory;
use chrono::{NaiveDateTime, Timelike};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const MINUTES_PER_DAY: i64 = 1440;

/// First-day fee for a resource created at `now`: the daily price scaled by
/// the minutes left in the calendar day, rounded half-up to 2 decimals.
/// A resource created exactly at midnight pays the full daily price.
pub fn prorated_first_day_fee(daily_price: Decimal, now: NaiveDateTime) -> Decimal {
    let minutes_elapsed = i64::from(now.hour()) * 60 + i64::from(now.minute());
    let minutes_remaining = MINUTES_PER_DAY - minutes_elapsed;
    (daily_price * (Decimal::from_i64(minutes_remaining) / Decimal::from_i64(MINUTES_PER_DAY)))
        .round_money()
}

/// Result of creating a marketing instance's billing state.
#[derive(Debug, Clone)]
pub struct PreDeductReceipt {
    /// Root account actually charged.
    pub account_id: UserId,
    pub reserved_amount: Decimal,
    pub first_day_fee: Decimal,
    pub balance: UserBalance,
}

/// Outcome counters for one daily-tick run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub charged: u32,
    pub skipped: u32,
    pub failed: u32,
}

pub struct BillingCycle {
    repo: Arc<Repository>,
    store: Arc<BalanceStore>,
    directory: Arc<dyn OrgDirectory>,
    pre_deduct_price: Decimal,
}

impl BillingCycle {
    pub fn new(
        repo: Arc<Repository>,
        store: Arc<BalanceStore>,
        directory: Arc<dyn OrgDirectory>,
        pre_deduct_price: Decimal,
    ) -> Self {
        Self {
            repo,
            store,
            directory,
            pre_deduct_price,
        }
    }

    /// Unit price of a marketing-instance reservation: the catalog row when
    /// an active one exists, the configured default otherwise.
    pub async fn pre_deduct_unit_price(&self) -> Result<Decimal, LedgerError> {
        match self
            .repo
            .get_price_config(BUSINESS_INSTANCE_PRE_DEDUCT)
            .await?
        {
            Some(price) if price.is_active() => Ok(price.dr_price),
            _ => Ok(self.pre_deduct_price),
        }
    }

    /// How many more marketing instances the user's root account can afford:
    /// `floor(available / unit_price)`, never negative.
    pub async fn available_marketing_instance_count(
        &self,
        user_id: UserId,
    ) -> Result<i64, LedgerError> {
        let root = self.directory.root_account_id(user_id).await?;
        let balance = self.store.get_or_create(root).await?;
        let unit_price = self.pre_deduct_unit_price().await?;
        let count = (balance.available() / unit_price).to_i64_floor();
        Ok(count.max(0))
    }

    /// Set up billing for a newly created marketing instance.
    ///
    /// Resolves the root account, gates on the instance quota, reserves the
    /// pre-deduction, charges the prorated first day out of the reservation,
    /// and registers the resource for the daily tick. `now_local` is the
    /// creation time in the billing timezone.
    pub async fn pre_deduct_for_instance(
        &self,
        user_id: UserId,
        resource_id: &ResourceId,
        now_local: NaiveDateTime,
    ) -> Result<PreDeductReceipt, LedgerError> {
        let root = self.directory.root_account_id(user_id).await?;

        if self.repo.get_resource(resource_id).await?.is_some() {
            return Err(LedgerError::Validation(format!(
                "resource {} is already registered for billing",
                resource_id.as_str()
            )));
        }

        let quota = self.available_marketing_instance_count(root).await?;
        let unit_price = self.pre_deduct_unit_price().await?;
        if quota == 0 {
            return Err(LedgerError::InsufficientQuota(format!(
                "account {} cannot afford another marketing instance (unit price {})",
                root, unit_price
            )));
        }

        let price = self.require_price(BUSINESS_INSTANCE_MARKETING).await?;

        let reserve_details =
            BillingDetails::instant(root, BUSINESS_INSTANCE_PRE_DEDUCT, "instance pre-deduction")
                .with_business_id(resource_id.as_str());
        let reserved = self
            .store
            .reserve(root, unit_price, &reserve_details)
            .await?;

        // First calendar day is charged immediately, prorated to the minutes
        // remaining; the tick starts charging from tomorrow.
        let mut first_day_fee = Decimal::zero();
        let mut balance = reserved.balance;
        if price.is_active() {
            let fee = prorated_first_day_fee(price.dr_price, now_local);
            if fee.is_positive() {
                let fee_details = BillingDetails::instant(
                    root,
                    BUSINESS_INSTANCE_MARKETING,
                    "instance first-day prorated fee",
                )
                .with_billing_type(BillingType::Daily)
                .with_business_id(resource_id.as_str());
                match self.store.consume_reservation(root, fee, &fee_details).await {
                    Ok(charged) => {
                        first_day_fee = fee;
                        balance = charged.balance;
                    }
                    Err(err) => {
                        self.unwind_pre_deduction(root, resource_id, unit_price, Decimal::zero())
                            .await;
                        return Err(err);
                    }
                }
            }
        } else {
            debug!(
                resource = resource_id.as_str(),
                "price config inactive, first-day fee skipped"
            );
        }

        let resource = BillableResource {
            resource_id: resource_id.clone(),
            owner_user_id: root,
            business_type: BUSINESS_INSTANCE_MARKETING.to_string(),
            status: ResourceStatus::Active,
            total_billed_days: if first_day_fee.is_positive() { 1 } else { 0 },
            total_billed_amount: first_day_fee,
            last_billed_day: Some(now_local.date()),
        };
        match self.repo.register_resource(&resource).await {
            Ok(true) => {}
            Ok(false) => {
                self.unwind_pre_deduction(root, resource_id, unit_price, first_day_fee)
                    .await;
                return Err(LedgerError::Validation(format!(
                    "resource {} is already registered for billing",
                    resource_id.as_str()
                )));
            }
            Err(err) => {
                self.unwind_pre_deduction(root, resource_id, unit_price, first_day_fee)
                    .await;
                return Err(err.into());
            }
        }

        info!(
            resource = resource_id.as_str(),
            account = root.as_i64(),
            reserved = %unit_price,
            first_day_fee = %first_day_fee,
            "instance billing registered"
        );

        Ok(PreDeductReceipt {
            account_id: root,
            reserved_amount: unit_price,
            first_day_fee,
            balance,
        })
    }

    /// Undo a reservation whose instance never got registered: the unspent
    /// part of the pool goes back to the main balance, and any first-day fee
    /// already drawn is refunded. Best effort; a failure here is logged with
    /// the amounts so the account can be reconciled by hand.
    async fn unwind_pre_deduction(
        &self,
        root: UserId,
        resource_id: &ResourceId,
        reserved_amount: Decimal,
        fee_drawn: Decimal,
    ) {
        let details = BillingDetails::instant(
            root,
            BUSINESS_INSTANCE_PRE_DEDUCT,
            "instance pre-deduction reversal",
        )
        .with_business_id(resource_id.as_str());

        let remaining = reserved_amount - fee_drawn;
        if remaining.is_positive() {
            if let Err(err) = self.store.release_reservation(root, remaining, &details).await {
                error!(
                    resource = resource_id.as_str(),
                    account = root.as_i64(),
                    amount = %remaining,
                    error = %err,
                    "failed to release pre-deduction, funds stranded in pool"
                );
            }
        }
        if fee_drawn.is_positive() {
            if let Err(err) = self.store.refund(root, fee_drawn, &details).await {
                error!(
                    resource = resource_id.as_str(),
                    account = root.as_i64(),
                    amount = %fee_drawn,
                    error = %err,
                    "failed to refund first-day fee for unregistered instance"
                );
            }
        }
    }

    /// Stop daily billing for a released resource.
    pub async fn stop_resource(&self, resource_id: &ResourceId) -> Result<(), LedgerError> {
        if self.repo.get_resource(resource_id).await?.is_none() {
            return Err(LedgerError::NotFound(format!(
                "resource {}",
                resource_id.as_str()
            )));
        }
        self.repo
            .set_resource_status(resource_id, ResourceStatus::Stopped)
            .await?;
        info!(resource = resource_id.as_str(), "resource billing stopped");
        Ok(())
    }

    /// Charge every ACTIVE resource not yet billed for `now`'s calendar day.
    ///
    /// Resources whose price config is INACTIVE or not DAILY are skipped
    /// without error. A failure on one resource is logged and does not abort
    /// the batch; the resource stays due and the next tick retries it.
    pub async fn run_daily_tick(&self, now: NaiveDateTime) -> Result<TickSummary, LedgerError> {
        let day = now.date();
        let due = self.repo.list_due_resources(day).await?;
        let mut summary = TickSummary::default();

        for resource in &due {
            let price = match self.repo.get_price_config(&resource.business_type).await? {
                Some(price) => price,
                None => {
                    warn!(
                        resource = resource.resource_id.as_str(),
                        business_type = %resource.business_type,
                        "no price config for due resource, skipping"
                    );
                    summary.skipped += 1;
                    continue;
                }
            };
            if !price.is_active() || price.billing_type != BillingType::Daily {
                summary.skipped += 1;
                continue;
            }

            match self.charge_resource(resource, &price, day).await {
                Ok(()) => summary.charged += 1,
                Err(err) => {
                    warn!(
                        resource = resource.resource_id.as_str(),
                        owner = resource.owner_user_id.as_i64(),
                        error = %err,
                        "daily charge failed, will retry next tick"
                    );
                    summary.failed += 1;
                }
            }
        }

        info!(
            day = %day,
            charged = summary.charged,
            skipped = summary.skipped,
            failed = summary.failed,
            "daily tick complete"
        );
        Ok(summary)
    }

    async fn charge_resource(
        &self,
        resource: &BillableResource,
        price: &PriceConfig,
        day: chrono::NaiveDate,
    ) -> Result<(), LedgerError> {
        let owner = resource.owner_user_id;
        let details = BillingDetails::instant(
            owner,
            &resource.business_type,
            &format!("daily fee for {}", day),
        )
        .with_billing_type(BillingType::Daily)
        .with_business_id(resource.resource_id.as_str());

        // Draw the reservation down first; once the pool is exhausted the
        // charge lands on the main balance.
        match self
            .store
            .consume_reservation(owner, price.dr_price, &details)
            .await
        {
            Ok(_) => {}
            Err(LedgerError::InsufficientBalance(_)) => {
                self.store.debit(owner, price.dr_price, &details, false).await?;
            }
            Err(err) => return Err(err),
        }

        self.repo
            .mark_resource_billed(
                &resource.resource_id,
                day,
                resource.total_billed_amount + price.dr_price,
            )
            .await?;
        Ok(())
    }

    async fn require_price(&self, business_type: &str) -> Result<PriceConfig, LedgerError> {
        self.repo
            .get_price_config(business_type)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("price config {}", business_type)))
    }
}
