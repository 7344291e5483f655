use drledger::engine::{
    BalanceStore, BillingCycle, CommissionEngine, LedgerService, SettlementService,
};
use drledger::hierarchy::{
    HierarchyResolver, MockHierarchy, MockOrgDirectory, OrgDirectory,
};
use drledger::{api, config::Config, db::init_db, Repository};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let port = config.port;

    // Initialize database and dependencies
    let pool = match init_db(&config.database_path).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let repo = Arc::new(Repository::new(pool));
    // Standalone deployment: the referral tree and org directory are served
    // in-process. A networked resolver can be swapped in behind the traits.
    let hierarchy: Arc<dyn HierarchyResolver> = Arc::new(MockHierarchy::new());
    let directory: Arc<dyn OrgDirectory> = Arc::new(MockOrgDirectory::new());

    let store = Arc::new(BalanceStore::new(repo.clone(), config.max_cas_retries));
    let commission = Arc::new(CommissionEngine::new(
        repo.clone(),
        hierarchy,
        config.commission_rates.clone(),
        config.max_cas_retries,
    ));
    let ledger = Arc::new(LedgerService::new(
        repo.clone(),
        store.clone(),
        commission.clone(),
        directory.clone(),
    ));
    let billing_cycle = Arc::new(BillingCycle::new(
        repo.clone(),
        store.clone(),
        directory,
        config.pre_deduct_price,
    ));
    let settlements = Arc::new(SettlementService::new(repo.clone(), config.max_cas_retries));

    // Recurring-billing tick
    if config.daily_tick_secs > 0 {
        let tick_cycle = billing_cycle.clone();
        let tick_secs = config.daily_tick_secs;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(tick_secs));
            loop {
                interval.tick().await;
                let now = chrono::Utc::now().naive_utc();
                if let Err(e) = tick_cycle.run_daily_tick(now).await {
                    tracing::error!(error = %e, "daily billing tick failed");
                }
            }
        });
        tracing::info!(interval_secs = tick_secs, "daily billing tick scheduled");
    } else {
        tracing::warn!("daily billing tick disabled (DAILY_TICK_SECS=0)");
    }

    // Create router
    let app = api::create_router(api::AppState::new(
        repo,
        config,
        ledger,
        billing_cycle,
        settlements,
        commission,
    ));

    // Bind to address
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on {}", addr);

    // Run server
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
