//! Checkout and webhook reconciliation against PostgreSQL.
//!
//! Every test works on its own products, so tests can share one container
//! without truncating tables. Run with:
//!
//! ```bash
//! cargo test -p checkout --test postgres_checkout
//! ```

use std::sync::Arc;
use std::time::Duration;

use checkout::{
    CheckoutError, CheckoutRequest, LineRequest, NewPayment, OrderAssembler, OrderService,
    ReconcileOutcome, WebhookReconciler,
};
use common::{Money, ProductId};
use domain::{AddressFields, AddressInput, OrderStatus, PaymentStatus};
use serde_json::json;
use sqlx::PgPool;
use store::PostgresStore;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_checkout_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .connect(&info.connection_string)
        .await
        .unwrap();
    PostgresStore::new(pool)
}

fn assembler(store: &PostgresStore) -> Arc<OrderAssembler<PostgresStore>> {
    Arc::new(OrderAssembler::new(store.clone()).with_timeout(Duration::from_secs(30)))
}

async fn seed_product(store: &PostgresStore, name: &str, stock: i64) -> ProductId {
    let id = ProductId::new();
    sqlx::query(
        "INSERT INTO products (id, name, price_cents, stock_quantity) VALUES ($1, $2, $3, $4)",
    )
    .bind(id.as_uuid())
    .bind(name)
    .bind(1000_i64)
    .bind(stock)
    .execute(store.pool())
    .await
    .unwrap();
    id
}

async fn stock_of(store: &PostgresStore, id: ProductId) -> i64 {
    sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = $1")
        .bind(id.as_uuid())
        .fetch_one(store.pool())
        .await
        .unwrap()
}

async fn orders_with(store: &PostgresStore, id: ProductId) -> i64 {
    sqlx::query_scalar("SELECT COUNT(DISTINCT order_id) FROM order_items WHERE product_id = $1")
        .bind(id.as_uuid())
        .fetch_one(store.pool())
        .await
        .unwrap()
}

async fn addresses_named(store: &PostgresStore, full_name: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM addresses WHERE full_name = $1")
        .bind(full_name)
        .fetch_one(store.pool())
        .await
        .unwrap()
}

fn address(full_name: &str) -> AddressInput {
    AddressInput::Inline(AddressFields {
        full_name: full_name.to_string(),
        line1: "1 Navy Way".to_string(),
        city: "Arlington".to_string(),
        postal_code: "22202".to_string(),
        country: "US".to_string(),
        ..AddressFields::default()
    })
}

fn guest_order(lines: Vec<LineRequest>) -> CheckoutRequest {
    CheckoutRequest::for_guest("guest@example.com", address("Grace Hopper"), lines)
}

#[tokio::test]
async fn opposite_line_orders_do_not_deadlock() {
    let store = get_test_store().await;
    let p = seed_product(&store, "P", 1000).await;
    let q = seed_product(&store, "Q", 1000).await;
    let assembler = assembler(&store);

    let mut handles = Vec::new();
    for i in 0..40 {
        let assembler = assembler.clone();
        let lines = if i % 2 == 0 {
            vec![LineRequest::new(p, 1), LineRequest::new(q, 1)]
        } else {
            vec![LineRequest::new(q, 1), LineRequest::new(p, 1)]
        };
        handles.push(tokio::spawn(async move {
            assembler.checkout(guest_order(lines)).await
        }));
    }

    for handle in handles {
        if let Err(err) = handle.await.unwrap() {
            panic!("checkout failed: {err}");
        }
    }

    assert_eq!(stock_of(&store, p).await, 960);
    assert_eq!(stock_of(&store, q).await, 960);
    assert_eq!(orders_with(&store, p).await, 40);
}

#[tokio::test]
async fn parallel_checkouts_exhaust_stock_exactly() {
    let store = get_test_store().await;
    let product = seed_product(&store, "Limited", 7).await;
    let assembler = assembler(&store);

    let mut handles = Vec::new();
    for _ in 0..20 {
        let assembler = assembler.clone();
        handles.push(tokio::spawn(async move {
            assembler
                .checkout(guest_order(vec![LineRequest::new(product, 1)]))
                .await
        }));
    }

    let mut succeeded = 0;
    let mut out_of_stock = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(CheckoutError::InsufficientStock { .. }) => out_of_stock += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, 7);
    assert_eq!(out_of_stock, 13);
    assert_eq!(stock_of(&store, product).await, 0);
    assert_eq!(orders_with(&store, product).await, 7);
}

#[tokio::test]
async fn failure_on_second_line_rolls_back_the_whole_order() {
    let store = get_test_store().await;
    let a = seed_product(&store, "A", 5).await;
    let b = seed_product(&store, "B", 1).await;
    let c = seed_product(&store, "C", 5).await;
    let full_name = format!("Rollback {a}");

    let err = assembler(&store)
        .checkout(CheckoutRequest::for_guest(
            "guest@example.com",
            address(&full_name),
            vec![
                LineRequest::new(a, 1),
                LineRequest::new(b, 2),
                LineRequest::new(c, 1),
            ],
        ))
        .await
        .unwrap_err();

    match err {
        CheckoutError::InsufficientStock {
            product_id,
            product_name,
            line,
            requested,
        } => {
            assert_eq!(product_id, b);
            assert_eq!(product_name, "B");
            assert_eq!(line, 2);
            assert_eq!(requested, 2);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }
    assert_eq!(stock_of(&store, a).await, 5);
    assert_eq!(stock_of(&store, b).await, 1);
    assert_eq!(stock_of(&store, c).await, 5);
    assert_eq!(orders_with(&store, a).await, 0);
    assert_eq!(addresses_named(&store, &full_name).await, 0);
}

#[tokio::test]
async fn concurrent_duplicate_captures_move_the_order_once() {
    let store = get_test_store().await;
    let product = seed_product(&store, "Captured", 5).await;
    let transaction_id = format!("CAPTURE-{product}");

    let receipt = assembler(&store)
        .checkout(
            guest_order(vec![LineRequest::new(product, 1)]).with_payment(NewPayment::new(
                Money::from_cents(1000),
                "paypal",
                transaction_id.clone(),
                PaymentStatus::Pending,
            )),
        )
        .await
        .unwrap();
    assert_eq!(receipt.order.status, OrderStatus::PendingPayment);

    let reconciler = Arc::new(WebhookReconciler::new(store.clone()));
    let body = json!({
        "id": "WH-1",
        "event_type": "PAYMENT.CAPTURE.COMPLETED",
        "resource": {"id": transaction_id, "status": "COMPLETED"}
    })
    .to_string();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let reconciler = reconciler.clone();
        let body = body.clone();
        handles.push(tokio::spawn(async move {
            reconciler.apply_payload(body.as_bytes()).await
        }));
    }

    let mut applied = 0;
    for handle in handles {
        let ack = handle.await.unwrap();
        assert!(ack.received());
        match ack.outcome {
            ReconcileOutcome::Applied => applied += 1,
            ReconcileOutcome::AlreadyApplied => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
    assert_eq!(applied, 1);

    let details = OrderService::new(store.clone())
        .order_details(receipt.order.id)
        .await
        .unwrap();
    assert_eq!(details.order.status, OrderStatus::Processing);
    assert_eq!(details.payments.len(), 1);
    assert_eq!(details.payments[0].status, PaymentStatus::Succeeded);
}
