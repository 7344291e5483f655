use axum::http::StatusCode;
use drledger::api;
use drledger::config::Config;
use drledger::db::init_db;
use drledger::engine::{
    BalanceStore, BillingCycle, CommissionEngine, LedgerService, SettlementService,
};
use drledger::hierarchy::{MockHierarchy, MockOrgDirectory};
use drledger::{Decimal, Repository, UserId};
use std::str::FromStr;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

struct TestApp {
    app: axum::Router,
    _temp: TempDir,
}

/// App with buyer 1 referred by agent 2.
async fn setup_test_app() -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));

    let config = Config {
        port: 0,
        database_path: db_path,
        commission_rates: vec![
            Decimal::from_str("0.30").unwrap(),
            Decimal::from_str("0.20").unwrap(),
            Decimal::from_str("0.10").unwrap(),
        ],
        pre_deduct_price: Decimal::from_str("100").unwrap(),
        max_cas_retries: 3,
        daily_tick_secs: 0,
    };

    let u = UserId::new;
    let hierarchy = MockHierarchy::new().with_parent(u(1), u(2)).with_agent(u(2));

    let directory = Arc::new(MockOrgDirectory::new());
    let store = Arc::new(BalanceStore::new(repo.clone(), config.max_cas_retries));
    let commission = Arc::new(CommissionEngine::new(
        repo.clone(),
        Arc::new(hierarchy),
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
        store,
        directory,
        config.pre_deduct_price,
    ));
    let settlements = Arc::new(SettlementService::new(repo.clone(), config.max_cas_retries));

    let state = api::AppState::new(repo, config, ledger, billing_cycle, settlements, commission);
    TestApp {
        app: api::create_router(state),
        _temp: temp_dir,
    }
}

async fn post_json(
    app: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Recharge 1000 as buyer 1, accruing 300 to agent 2.
async fn fund_agent(app: &axum::Router) {
    let (status, _b) = post_json(
        app.clone(),
        "/v1/balance/recharge",
        serde_json::json!({"userId": 1, "amount": 1000, "operatorId": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

fn apply_body(amount: i64) -> serde_json::Value {
    serde_json::json!({
        "agentUserId": 2,
        "amount": amount,
        "network": "TRC20",
        "address": "Taddr123",
    })
}

#[tokio::test]
async fn test_apply_creates_pending_settlement() {
    let test_app = setup_test_app().await;
    fund_agent(&test_app.app).await;

    let (status, body) = post_json(test_app.app.clone(), "/v1/settlements", apply_body(200)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["requestedAmount"], "200");
    assert_eq!(body["network"], "TRC20");
    assert!(body["settlementId"].as_i64().unwrap() > 0);

    let (_s, list) = get(test_app.app, "/v1/settlements?agentUserId=2").await;
    assert_eq!(list["settlements"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_apply_beyond_available_is_422() {
    let test_app = setup_test_app().await;
    fund_agent(&test_app.app).await;

    // Only 300 accrued.
    let (status, _b) = post_json(test_app.app, "/v1/settlements", apply_body(400)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_pending_amounts_reserve_available() {
    let test_app = setup_test_app().await;
    fund_agent(&test_app.app).await;

    let (status, _b) = post_json(test_app.app.clone(), "/v1/settlements", apply_body(250)).await;
    assert_eq!(status, StatusCode::OK);

    // 250 of 300 is already pending.
    let (status, _b) = post_json(test_app.app, "/v1/settlements", apply_body(100)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_approve_moves_settled_commission() {
    let test_app = setup_test_app().await;
    fund_agent(&test_app.app).await;

    let (_s, settlement) = post_json(test_app.app.clone(), "/v1/settlements", apply_body(200)).await;
    let id = settlement["settlementId"].as_i64().unwrap();

    let (status, body) = post_json(
        test_app.app.clone(),
        &format!("/v1/settlements/{}/approve", id),
        serde_json::json!({"operatorId": 99, "remark": "paid"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "APPROVED");
    assert_eq!(body["approvedAmount"], "200");
    assert_eq!(body["operatorId"], 99);

    let (_s, account) = get(test_app.app, "/v1/commission/account?agentUserId=2").await;
    assert_eq!(account["totalCommission"], "300");
    assert_eq!(account["settledCommission"], "200");
    assert_eq!(account["availableCommission"], "100");
}

#[tokio::test]
async fn test_partial_approval_amount() {
    let test_app = setup_test_app().await;
    fund_agent(&test_app.app).await;

    let (_s, settlement) = post_json(test_app.app.clone(), "/v1/settlements", apply_body(200)).await;
    let id = settlement["settlementId"].as_i64().unwrap();

    let (status, body) = post_json(
        test_app.app,
        &format!("/v1/settlements/{}/approve", id),
        serde_json::json!({"operatorId": 99, "approvedAmount": 150}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["approvedAmount"], "150");
    assert_eq!(body["requestedAmount"], "200");
}

#[tokio::test]
async fn test_second_transition_is_409() {
    let test_app = setup_test_app().await;
    fund_agent(&test_app.app).await;

    let (_s, settlement) = post_json(test_app.app.clone(), "/v1/settlements", apply_body(100)).await;
    let id = settlement["settlementId"].as_i64().unwrap();

    post_json(
        test_app.app.clone(),
        &format!("/v1/settlements/{}/reject", id),
        serde_json::json!({"operatorId": 99, "remark": "bad address"}),
    )
    .await;

    let (status, _b) = post_json(
        test_app.app,
        &format!("/v1/settlements/{}/approve", id),
        serde_json::json!({"operatorId": 99}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_reject_releases_reservation() {
    let test_app = setup_test_app().await;
    fund_agent(&test_app.app).await;

    let (_s, settlement) = post_json(test_app.app.clone(), "/v1/settlements", apply_body(300)).await;
    let id = settlement["settlementId"].as_i64().unwrap();

    let (status, body) = post_json(
        test_app.app.clone(),
        &format!("/v1/settlements/{}/reject", id),
        serde_json::json!({"operatorId": 99}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "REJECTED");

    // The full 300 is requestable again.
    let (status, _b) = post_json(test_app.app, "/v1/settlements", apply_body(300)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_cancel_by_owner_only() {
    let test_app = setup_test_app().await;
    fund_agent(&test_app.app).await;

    let (_s, settlement) = post_json(test_app.app.clone(), "/v1/settlements", apply_body(100)).await;
    let id = settlement["settlementId"].as_i64().unwrap();

    let (status, _b) = post_json(
        test_app.app.clone(),
        &format!("/v1/settlements/{}/cancel", id),
        serde_json::json!({"userId": 42}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post_json(
        test_app.app,
        &format!("/v1/settlements/{}/cancel", id),
        serde_json::json!({"userId": 2}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CANCELLED");
}

#[tokio::test]
async fn test_unknown_settlement_is_404() {
    let test_app = setup_test_app().await;

    let (status, _b) = post_json(
        test_app.app,
        "/v1/settlements/999/approve",
        serde_json::json!({"operatorId": 99}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_apply_without_commission_account_is_404() {
    let test_app = setup_test_app().await;

    let (status, _b) = post_json(
        test_app.app,
        "/v1/settlements",
        serde_json::json!({"agentUserId": 77, "amount": 10, "network": "TRC20", "address": "T"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_apply_requires_payout_destination() {
    let test_app = setup_test_app().await;
    fund_agent(&test_app.app).await;

    let (status, _b) = post_json(
        test_app.app,
        "/v1/settlements",
        serde_json::json!({"agentUserId": 2, "amount": 100, "network": "", "address": ""}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
