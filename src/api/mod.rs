pub mod balance;
pub mod commission;
pub mod health;
pub mod instances;
pub mod settlements;

use crate::config::Config;
use crate::db::Repository;
use crate::engine::{BillingCycle, CommissionEngine, LedgerService, SettlementService};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub ledger: Arc<LedgerService>,
    pub billing_cycle: Arc<BillingCycle>,
    pub settlements: Arc<SettlementService>,
    pub commission: Arc<CommissionEngine>,
}

impl AppState {
    pub fn new(
        repo: Arc<Repository>,
        config: Config,
        ledger: Arc<LedgerService>,
        billing_cycle: Arc<BillingCycle>,
        settlements: Arc<SettlementService>,
        commission: Arc<CommissionEngine>,
    ) -> Self {
        Self {
            repo,
            config,
            ledger,
            billing_cycle,
            settlements,
            commission,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/balance/recharge", post(balance::recharge))
        .route("/v1/balance/deduct", post(balance::deduct))
        .route("/v1/balance/adjust", post(balance::adjust))
        .route("/v1/balance", get(balance::get_balance))
        .route("/v1/balance/records", get(balance::get_records))
        .route("/v1/instances/pre-deduct", post(instances::pre_deduct))
        .route("/v1/instances/quota", get(instances::get_quota))
        .route(
            "/v1/settlements",
            post(settlements::apply).get(settlements::list),
        )
        .route("/v1/settlements/:id/approve", post(settlements::approve))
        .route("/v1/settlements/:id/reject", post(settlements::reject))
        .route("/v1/settlements/:id/cancel", post(settlements::cancel))
        .route("/v1/commission/account", get(commission::get_account))
        .route("/v1/commission/records", get(commission::get_records))
        .route("/v1/commission/reaccrue", post(commission::reaccrue))
        .layer(cors)
        .with_state(state)
}
