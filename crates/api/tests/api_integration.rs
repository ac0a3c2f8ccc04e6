//! Integration tests for the API server.

use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{Money, ProductId, UserId};
use domain::{AddressFields, AddressKind, CartLine, NewAddress, Product};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::InMemoryStore;
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

fn setup() -> (axum::Router, InMemoryStore) {
    let store = InMemoryStore::new();
    let state = api::create_default_state(store.clone());
    (api::create_app(state, get_metrics_handle()), store)
}

async fn seed_product(store: &InMemoryStore, cents: i64, stock: i64) -> ProductId {
    let product = Product::new("Widget", Money::from_cents(cents), stock);
    let id = product.id;
    store.put_product(product).await;
    id
}

fn inline_address() -> Value {
    json!({
        "full_name": "Ada Lovelace",
        "line1": "12 St James's Square",
        "city": "London",
        "postal_code": "SW1Y 4JH",
        "country": "GB"
    })
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

fn json_request(method: &str, uri: &str, body: Value, headers: &[(&str, String)]) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, value);
    }
    builder
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn post_json(uri: &str, body: Value, headers: &[(&str, String)]) -> Request<Body> {
    json_request("POST", uri, body, headers)
}

fn put_json(uri: &str, body: Value, headers: &[(&str, String)]) -> Request<Body> {
    json_request("PUT", uri, body, headers)
}

fn get_with(uri: &str, headers: &[(&str, String)]) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, value);
    }
    builder.body(Body::empty()).unwrap()
}

fn as_user(user: UserId) -> Vec<(&'static str, String)> {
    vec![("x-user-id", user.to_string())]
}

fn as_admin() -> Vec<(&'static str, String)> {
    vec![("x-user-role", "admin".to_string())]
}

/// Places a guest order for one unit and returns its id.
async fn guest_order(app: &axum::Router, product: ProductId, payment: Option<Value>) -> String {
    let mut body = json!({
        "email": "guest@example.com",
        "shipping_address": inline_address(),
        "items": [{"product_id": product, "quantity": 1}]
    });
    if let Some(payment) = payment {
        body["payment"] = payment;
    }
    let (status, json) = send(app, post_json("/orders", body, &[])).await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json["order_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup();

    let (status, json) = send(&app, get_with("/health", &[])).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_unknown_route_is_json_not_found() {
    let (app, _) = setup();

    let (status, json) = send(&app, get_with("/carts/mine", &[])).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "No route for /carts/mine");
}

#[tokio::test]
async fn test_guest_checkout() {
    let (app, store) = setup();
    let product = seed_product(&store, 1000, 5).await;

    let (status, json) = send(
        &app,
        post_json(
            "/orders",
            json!({
                "email": "guest@example.com",
                "shipping_address": inline_address(),
                "same_as_shipping": true,
                "items": [{"product_id": product, "quantity": 2}]
            }),
            &[],
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["status"], "pending_payment");
    assert_eq!(json["total_amount"], 2000);
    assert!(json["order_id"].as_str().is_some());
    assert_eq!(store.stock_of(product).await, Some(3));
}

#[tokio::test]
async fn test_cart_checkout_with_saved_address_and_payment() {
    let (app, store) = setup();
    let user = UserId::new();
    let product = seed_product(&store, 1500, 5).await;
    store
        .set_cart(user, vec![CartLine::new(product, 2, Money::from_cents(1200))])
        .await;
    let address = store
        .put_address(NewAddress {
            user_id: Some(user),
            kind: AddressKind::Shipping,
            fields: AddressFields {
                full_name: "Ada Lovelace".to_string(),
                line1: "12 St James's Square".to_string(),
                city: "London".to_string(),
                postal_code: "SW1Y 4JH".to_string(),
                country: "GB".to_string(),
                ..AddressFields::default()
            },
            is_default: true,
        })
        .await;

    let (status, json) = send(
        &app,
        post_json(
            "/orders",
            json!({
                "shipping_address": {"address_id": address.id},
                "payment": {
                    "amount": 2400,
                    "payment_method": "card",
                    "transaction_id": "TX-CART",
                    "status": "succeeded"
                }
            }),
            &as_user(user),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED, "{json}");
    assert_eq!(json["status"], "processing");
    assert_eq!(json["total_amount"], 2400);
    assert!(store.cart(user).await.is_empty());
}

#[tokio::test]
async fn test_insufficient_stock_is_bad_request() {
    let (app, store) = setup();
    let product = seed_product(&store, 1000, 1).await;

    let (status, json) = send(
        &app,
        post_json(
            "/orders",
            json!({
                "email": "guest@example.com",
                "shipping_address": inline_address(),
                "items": [{"product_id": product, "quantity": 2}]
            }),
            &[],
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("Insufficient stock"));
    assert_eq!(store.order_count().await, 0);
}

#[tokio::test]
async fn test_checkout_validation_errors() {
    let (app, store) = setup();
    let product = seed_product(&store, 1000, 5).await;

    // Guest without email.
    let (status, _) = send(
        &app,
        post_json(
            "/orders",
            json!({
                "shipping_address": inline_address(),
                "items": [{"product_id": product, "quantity": 1}]
            }),
            &[],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Missing shipping address.
    let (status, json) = send(&app, post_json("/orders", json!({"items": []}), &[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    // Address reference that is not an id.
    let (status, json) = send(
        &app,
        post_json(
            "/orders",
            json!({
                "email": "guest@example.com",
                "shipping_address": {"address_id": "not-a-uuid"},
                "items": [{"product_id": product, "quantity": 1}]
            }),
            &[],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = json["error"].as_str().unwrap();
    assert!(message.contains("invalid address_id"), "{message}");
    assert!(!message.contains("missing required fields"), "{message}");

    // Billing explicitly separate but absent.
    let (status, _) = send(
        &app,
        post_json(
            "/orders",
            json!({
                "email": "guest@example.com",
                "shipping_address": inline_address(),
                "same_as_shipping": false,
                "items": [{"product_id": product, "quantity": 1}]
            }),
            &[],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Empty cart.
    let (status, json) = send(
        &app,
        post_json(
            "/orders",
            json!({"shipping_address": inline_address()}),
            &as_user(UserId::new()),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Order has no items");
}

#[tokio::test]
async fn test_foreign_address_is_forbidden() {
    let (app, store) = setup();
    let product = seed_product(&store, 1000, 5).await;
    let address = store
        .put_address(NewAddress {
            user_id: Some(UserId::new()),
            kind: AddressKind::Shipping,
            fields: AddressFields {
                full_name: "Someone Else".to_string(),
                line1: "1 Elsewhere".to_string(),
                city: "Paris".to_string(),
                postal_code: "75001".to_string(),
                country: "FR".to_string(),
                ..AddressFields::default()
            },
            is_default: false,
        })
        .await;

    let (status, _) = send(
        &app,
        post_json(
            "/orders",
            json!({
                "shipping_address": {"address_id": address.id},
                "items": [{"product_id": product, "quantity": 1}]
            }),
            &as_user(UserId::new()),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(store.stock_of(product).await, Some(5));
}

#[tokio::test]
async fn test_get_order_visibility() {
    let (app, store) = setup();
    let owner = UserId::new();
    let product = seed_product(&store, 1000, 5).await;

    let (status, created) = send(
        &app,
        post_json(
            "/orders",
            json!({
                "shipping_address": inline_address(),
                "items": [{"product_id": product, "quantity": 1}]
            }),
            &as_user(owner),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let uri = format!("/orders/{}", created["order_id"].as_str().unwrap());

    let (status, order) = send(&app, get_with(&uri, &as_user(owner))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["id"], created["order_id"]);
    assert_eq!(order["items"].as_array().unwrap().len(), 1);
    assert_eq!(order["items"][0]["price_at_purchase"], 1000);

    let (status, _) = send(&app, get_with(&uri, &as_user(UserId::new()))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, get_with(&uri, &as_admin())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, get_with(&uri, &[])).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_get_nonexistent_and_invalid_order() {
    let (app, _) = setup();

    let (status, _) = send(
        &app,
        get_with(
            "/orders/00000000-0000-0000-0000-000000000000",
            &as_admin(),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get_with("/orders/not-a-uuid", &as_admin())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_user_header_is_rejected() {
    let (app, _) = setup();
    let (status, _) = send(
        &app,
        get_with(
            "/orders/00000000-0000-0000-0000-000000000000",
            &[("x-user-id", "bogus".to_string())],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_record_payment_endpoint() {
    let (app, store) = setup();
    let product = seed_product(&store, 1000, 5).await;
    let order_id = guest_order(&app, product, None).await;
    let uri = format!("/orders/{order_id}/payments");
    let payment = json!({
        "amount": 1000,
        "payment_method": "paypal",
        "transaction_id": "CAPTURE-API",
        "status": "succeeded"
    });

    // Guest orders are admin-only.
    let (status, _) = send(&app, post_json(&uri, payment.clone(), &[])).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = send(&app, post_json(&uri, payment.clone(), &as_admin())).await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    assert_eq!(json["status"], "succeeded");
    assert_eq!(json["order_status"], "processing");

    let (status, _) = send(&app, post_json(&uri, payment, &as_admin())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_status_rules() {
    let (app, store) = setup();
    let product = seed_product(&store, 1000, 5).await;
    let order_id = guest_order(&app, product, None).await;
    let uri = format!("/orders/{order_id}/status");

    let (status, _) = send(
        &app,
        put_json(&uri, json!({"status": "processing"}), &as_user(UserId::new())),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, put_json(&uri, json!({"status": "shipped"}), &as_admin())).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, put_json(&uri, json!({"status": "lost"}), &as_admin())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(
        &app,
        put_json(&uri, json!({"status": "processing"}), &as_admin()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "processing");

    let (status, json) = send(
        &app,
        put_json(
            &uri,
            json!({"status": "shipped", "tracking_number": "1Z999"}),
            &as_admin(),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["order_id"], order_id);
    assert_eq!(json["status"], "shipped");
    assert_eq!(json["tracking_number"], "1Z999");
}

#[tokio::test]
async fn test_webhook_always_acknowledges() {
    let (app, store) = setup();
    let product = seed_product(&store, 1000, 5).await;
    let order_id = guest_order(
        &app,
        product,
        Some(json!({
            "amount": 1000,
            "payment_method": "paypal",
            "transaction_id": "CAPTURE-WH",
            "status": "pending"
        })),
    )
    .await;

    let event = json!({
        "event_type": "PAYMENT.CAPTURE.COMPLETED",
        "resource": {"id": "CAPTURE-WH"}
    });
    for _ in 0..2 {
        let (status, json) = send(
            &app,
            post_json("/webhooks/payment-gateway", event.clone(), &[]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["received"], true);
    }

    let (_, order) = send(&app, get_with(&format!("/orders/{order_id}"), &as_admin())).await;
    assert_eq!(order["status"], "processing");
    assert_eq!(order["payments"][0]["status"], "succeeded");

    let malformed = Request::builder()
        .method("POST")
        .uri("/webhooks/payment-gateway")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, json) = send(&app, malformed).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["received"], true);

    let (status, json) = send(
        &app,
        post_json(
            "/webhooks/payment-gateway",
            json!({"event_type": "PAYMENT.CAPTURE.COMPLETED", "resource": {"id": "UNKNOWN"}}),
            &[],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["received"], true);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, store) = setup();
    let product = seed_product(&store, 1000, 5).await;
    guest_order(&app, product, None).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("checkout_attempts_total"));
}
