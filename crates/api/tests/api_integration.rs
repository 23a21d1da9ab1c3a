//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use api::AppState;
use api::config::Config;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use catalog::{CatalogStore, InMemoryCatalogStore, NewCatalogItem};
use common::{ItemId, UserId};
use ledger::{InMemoryLedger, InventoryLedger, InventoryLedgerExt};
use metrics_exporter_prometheus::PrometheusHandle;
use orchestrator::{InMemoryIdentityAuthority, User};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

const ALICE: u32 = 42;
const INACTIVE: u32 = 13;

struct TestApp {
    app: axum::Router,
    state: Arc<AppState<InMemoryLedger>>,
    identity: InMemoryIdentityAuthority,
    catalog: InMemoryCatalogStore,
    ledger: InMemoryLedger,
    token: String,
}

async fn setup() -> TestApp {
    let identity = InMemoryIdentityAuthority::new();
    identity.add_user(User::new(UserId::new(ALICE), "alice")).await;
    identity
        .add_user(User::new(UserId::new(INACTIVE), "mallory").inactive())
        .await;
    let token = identity
        .issue_token(UserId::new(ALICE), Duration::from_secs(3600))
        .await
        .unwrap();

    let catalog = InMemoryCatalogStore::new();
    catalog
        .insert(
            NewCatalogItem::new("Widget", 9.99, 5).into_item(ItemId::new("I1"), UserId::new(1)),
        )
        .await;

    let ledger = InMemoryLedger::new();
    let config = Config::default();
    let state =
        api::create_default_state(ledger.clone(), identity.clone(), catalog.clone(), &config);
    let app = api::create_app(state.clone(), get_metrics_handle());

    TestApp {
        app,
        state,
        identity,
        catalog,
        ledger,
        token,
    }
}

fn authed(method: &str, uri: &str, token: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
}

fn stock_body(new_stock: i64) -> Body {
    Body::from(serde_json::json!({ "new_stock": new_stock }).to_string())
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let test = setup().await;

    let response = test
        .app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let test = setup().await;

    let response = test
        .app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_update_stock_then_get() {
    let test = setup().await;

    let response = test
        .app
        .clone()
        .oneshot(
            authed("POST", "/inventory/stock/I1", &test.token)
                .header("content-type", "application/json")
                .body(stock_body(10))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["item_id"], "I1");
    assert_eq!(json["data"]["stock"], 10);
    assert_eq!(json["data"]["updated_by"], ALICE);

    let item = test.catalog.get(&ItemId::new("I1")).await.unwrap().unwrap();
    assert_eq!(item.stock, 10);

    let response = test
        .app
        .oneshot(
            authed("GET", "/inventory/stock/I1", &test.token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["data"]["stock"], 10);
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let test = setup().await;

    let response = test
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/inventory/stock/I1")
                .header("content-type", "application/json")
                .body(stock_body(10))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = json_body(response).await;
    assert_eq!(json["success"], false);
    assert!(json.get("data").is_none());
    assert!(!test.ledger.exists(&ItemId::new("I1")).await.unwrap());
}

#[tokio::test]
async fn test_unknown_token_is_unauthorized() {
    let test = setup().await;

    let response = test
        .app
        .oneshot(
            authed("GET", "/inventory", "forged")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_inactive_user_is_unauthorized() {
    let test = setup().await;
    let token = test
        .identity
        .issue_token(UserId::new(INACTIVE), Duration::from_secs(3600))
        .await
        .unwrap();

    let response = test
        .app
        .oneshot(
            authed("POST", "/inventory/stock/I1", &token)
                .header("content-type", "application/json")
                .body(stock_body(10))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(test.ledger.record_count().await, 0);
    let item = test.catalog.get(&ItemId::new("I1")).await.unwrap().unwrap();
    assert_eq!(item.stock, 5);
}

#[tokio::test]
async fn test_identity_outage_is_unauthorized() {
    let test = setup().await;
    test.identity.set_fail_on_call(true);

    let response = test
        .app
        .oneshot(
            authed("GET", "/inventory", &test.token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_item_is_not_found() {
    let test = setup().await;

    let response = test
        .app
        .oneshot(
            authed("POST", "/inventory/stock/missing", &test.token)
                .header("content-type", "application/json")
                .body(stock_body(3))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(test.ledger.record_count().await, 0);
}

#[tokio::test]
async fn test_negative_stock_is_bad_request() {
    let test = setup().await;

    let response = test
        .app
        .oneshot(
            authed("POST", "/inventory/stock/I1", &test.token)
                .header("content-type", "application/json")
                .body(stock_body(-1))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let test = setup().await;

    let response = test
        .app
        .oneshot(
            authed("POST", "/inventory/stock/I1", &test.token)
                .header("content-type", "application/json")
                .body(Body::from("{\"new_stock\": \"lots\"}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_delete_item() {
    let test = setup().await;
    let ctx = test
        .state
        .orchestrator
        .authenticate(&test.token, Duration::from_secs(5))
        .await
        .unwrap();
    test.state
        .orchestrator
        .update_stock(&ctx, &ItemId::new("I1"), 7)
        .await
        .unwrap();

    let response = test
        .app
        .clone()
        .oneshot(
            authed("DELETE", "/inventory/item/I1", &test.token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["success"], true);
    assert!(test.catalog.get(&ItemId::new("I1")).await.unwrap().is_none());
    assert!(!test.ledger.exists(&ItemId::new("I1")).await.unwrap());

    let response = test
        .app
        .oneshot(
            authed("GET", "/inventory/stock/I1", &test.token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_without_record_is_not_found() {
    let test = setup().await;

    let response = test
        .app
        .oneshot(
            authed("DELETE", "/inventory/item/I1", &test.token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(test.catalog.get(&ItemId::new("I1")).await.unwrap().is_some());
}

#[tokio::test]
async fn test_list_inventory() {
    let test = setup().await;
    for stock in [3, 4] {
        test.app
            .clone()
            .oneshot(
                authed("POST", "/inventory/stock/I1", &test.token)
                    .header("content-type", "application/json")
                    .body(stock_body(stock))
                    .unwrap(),
            )
            .await
            .unwrap();
    }

    let response = test
        .app
        .oneshot(
            authed("GET", "/inventory", &test.token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    let data = json["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["stock"], 4);
    assert_eq!(test.ledger.outbox_depth(100).await.unwrap(), 2);
}

#[tokio::test]
async fn test_list_inventory_items_alias() {
    let test = setup().await;
    test.app
        .clone()
        .oneshot(
            authed("POST", "/inventory/stock/I1", &test.token)
                .header("content-type", "application/json")
                .body(stock_body(6))
                .unwrap(),
        )
        .await
        .unwrap();

    let response = test
        .app
        .oneshot(
            authed("GET", "/inventory/items", &test.token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    let data = json["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["item_id"], "I1");
    assert_eq!(data[0]["stock"], 6);
}
