use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AddressId, Money, OrderId, OrderItemId, PaymentId, ProductId, UserId};
use domain::{
    Address, AddressFields, CartLine, NewAddress, Order, OrderItem, OrderStatus, Payment,
    PaymentStatus, Product,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{
        AddressRepository, CartRepository, InventoryRepository, OrderRepository,
        PaymentRepository, Store, StoreTransaction,
    },
};

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        let tx = self.pool.begin().await?;
        Ok(PostgresTransaction { tx })
    }
}

/// A transaction over [`PostgresStore`]. Rolls back when dropped.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

fn quantity_from_row(row: &PgRow, column: &str) -> Result<u32> {
    let quantity: i32 = row.try_get(column)?;
    u32::try_from(quantity)
        .map_err(|_| StoreError::InvalidData(format!("negative {column}: {quantity}")))
}

fn row_to_product(row: PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        stock_quantity: row.try_get("stock_quantity")?,
    })
}

fn row_to_address(row: PgRow) -> Result<Address> {
    let kind: String = row.try_get("address_type")?;
    Ok(Address {
        id: AddressId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: row
            .try_get::<Option<Uuid>, _>("user_id")?
            .map(UserId::from_uuid),
        kind: kind.parse()?,
        fields: AddressFields {
            full_name: row.try_get("full_name")?,
            line1: row.try_get("line1")?,
            line2: row.try_get("line2")?,
            city: row.try_get("city")?,
            state: row.try_get("state")?,
            postal_code: row.try_get("postal_code")?,
            country: row.try_get("country")?,
            phone: row.try_get("phone")?,
        },
        is_default: row.try_get("is_default")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn row_to_order(row: PgRow) -> Result<Order> {
    let status: String = row.try_get("status")?;
    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: row
            .try_get::<Option<Uuid>, _>("user_id")?
            .map(UserId::from_uuid),
        status: status.parse::<OrderStatus>()?,
        total_amount: Money::from_cents(row.try_get("total_amount_cents")?),
        shipping_address_id: AddressId::from_uuid(row.try_get::<Uuid, _>("shipping_address_id")?),
        billing_address_id: AddressId::from_uuid(row.try_get::<Uuid, _>("billing_address_id")?),
        shipping_method: row.try_get("shipping_method")?,
        tracking_number: row.try_get("tracking_number")?,
        customer_notes: row.try_get("customer_notes")?,
        email: row.try_get("email")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn row_to_order_item(row: PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: OrderItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        quantity: quantity_from_row(&row, "quantity")?,
        price_at_purchase: Money::from_cents(row.try_get("price_at_purchase_cents")?),
    })
}

fn row_to_payment(row: PgRow) -> Result<Payment> {
    let status: String = row.try_get("status")?;
    Ok(Payment {
        id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        amount: Money::from_cents(row.try_get("amount_cents")?),
        payment_method: row.try_get("payment_method")?,
        transaction_id: row.try_get("transaction_id")?,
        status: status.parse::<PaymentStatus>()?,
        gateway_response: row.try_get("gateway_response")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn status_names<T: Copy>(statuses: &[T], name: impl Fn(T) -> &'static str) -> Vec<String> {
    statuses.iter().map(|s| name(*s).to_string()).collect()
}

#[async_trait]
impl InventoryRepository for PostgresTransaction {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, price_cents, stock_quantity
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_product).transpose()
    }

    async fn decrement_stock(&mut self, id: ProductId, quantity: u32) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock_quantity = stock_quantity - $2
            WHERE id = $1 AND stock_quantity >= $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(i64::from(quantity))
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl AddressRepository for PostgresTransaction {
    async fn address(&mut self, id: AddressId) -> Result<Option<Address>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, address_type, full_name, line1, line2, city, state,
                   postal_code, country, phone, is_default, created_at
            FROM addresses
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_address).transpose()
    }

    async fn insert_address(&mut self, address: NewAddress) -> Result<Address> {
        if address.is_default
            && let Some(user_id) = address.user_id
        {
            sqlx::query(
                r#"
                UPDATE addresses
                SET is_default = FALSE
                WHERE user_id = $1 AND address_type = $2 AND is_default
                "#,
            )
            .bind(user_id.as_uuid())
            .bind(address.kind.as_str())
            .execute(&mut *self.tx)
            .await?;
        }

        let stored = address.into_address(AddressId::new(), Utc::now());
        sqlx::query(
            r#"
            INSERT INTO addresses (id, user_id, address_type, full_name, line1, line2, city,
                                   state, postal_code, country, phone, is_default, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(stored.id.as_uuid())
        .bind(stored.user_id.map(|u| u.as_uuid()))
        .bind(stored.kind.as_str())
        .bind(&stored.fields.full_name)
        .bind(&stored.fields.line1)
        .bind(&stored.fields.line2)
        .bind(&stored.fields.city)
        .bind(&stored.fields.state)
        .bind(&stored.fields.postal_code)
        .bind(&stored.fields.country)
        .bind(&stored.fields.phone)
        .bind(stored.is_default)
        .bind(stored.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(stored)
    }
}

#[async_trait]
impl CartRepository for PostgresTransaction {
    async fn cart_lines(&mut self, user_id: UserId) -> Result<Vec<CartLine>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, quantity, price_at_addition_cents
            FROM cart_items
            WHERE user_id = $1
            ORDER BY added_at ASC, product_id ASC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<CartLine> {
                Ok(CartLine {
                    product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
                    quantity: quantity_from_row(&row, "quantity")?,
                    price_at_addition: Money::from_cents(row.try_get("price_at_addition_cents")?),
                })
            })
            .collect()
    }

    async fn clear_cart(&mut self, user_id: UserId) -> Result<()> {
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PostgresTransaction {
    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, status, total_amount_cents, shipping_address_id,
                                billing_address_id, shipping_method, tracking_number,
                                customer_notes, email, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.map(|u| u.as_uuid()))
        .bind(order.status.as_str())
        .bind(order.total_amount.cents())
        .bind(order.shipping_address_id.as_uuid())
        .bind(order.billing_address_id.as_uuid())
        .bind(&order.shipping_method)
        .bind(&order.tracking_number)
        .bind(&order.customer_notes)
        .bind(&order.email)
        .bind(order.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_order_items(&mut self, items: &[OrderItem]) -> Result<()> {
        for item in items {
            let quantity = i32::try_from(item.quantity).map_err(|_| {
                StoreError::InvalidData(format!("quantity {} out of range", item.quantity))
            })?;

            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, product_id, quantity, price_at_purchase_cents)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(item.order_id.as_uuid())
            .bind(item.product_id.as_uuid())
            .bind(quantity)
            .bind(item.price_at_purchase.cents())
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, status, total_amount_cents, shipping_address_id,
                   billing_address_id, shipping_method, tracking_number, customer_notes,
                   email, created_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_order).transpose()
    }

    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, quantity, price_at_purchase_cents
            FROM order_items
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_order_item).collect()
    }

    async fn transition_order_status(
        &mut self,
        id: OrderId,
        allowed_from: &[OrderStatus],
        to: OrderStatus,
        tracking_number: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, tracking_number = COALESCE($3, tracking_number)
            WHERE id = $1 AND status = ANY($4)
            "#,
        )
        .bind(id.as_uuid())
        .bind(to.as_str())
        .bind(tracking_number)
        .bind(status_names(allowed_from, |s: OrderStatus| s.as_str()))
        .execute(&mut *self.tx)
        .await?;

        tracing::debug!(order_id = %id, to = %to, rows = result.rows_affected(), "order status update");
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl PaymentRepository for PostgresTransaction {
    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, order_id, amount_cents, payment_method, transaction_id,
                                  status, gateway_response, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.order_id.as_uuid())
        .bind(payment.amount.cents())
        .bind(&payment.payment_method)
        .bind(&payment.transaction_id)
        .bind(payment.status.as_str())
        .bind(&payment.gateway_response)
        .bind(payment.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_payment_transaction_id")
            {
                return StoreError::DuplicateTransactionId(payment.transaction_id.clone());
            }
            StoreError::Database(e)
        })?;
        Ok(())
    }

    async fn payment_by_transaction_id(
        &mut self,
        transaction_id: &str,
    ) -> Result<Option<Payment>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, amount_cents, payment_method, transaction_id, status,
                   gateway_response, created_at
            FROM payments
            WHERE transaction_id = $1
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_payment).transpose()
    }

    async fn payments_for_order(&mut self, order_id: OrderId) -> Result<Vec<Payment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, amount_cents, payment_method, transaction_id, status,
                   gateway_response, created_at
            FROM payments
            WHERE order_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_payment).collect()
    }

    async fn transition_payment_status(
        &mut self,
        transaction_id: &str,
        allowed_from: &[PaymentStatus],
        to: PaymentStatus,
        gateway_response: Option<&serde_json::Value>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, gateway_response = COALESCE($3, gateway_response)
            WHERE transaction_id = $1 AND status = ANY($4)
            "#,
        )
        .bind(transaction_id)
        .bind(to.as_str())
        .bind(gateway_response)
        .bind(status_names(allowed_from, |s: PaymentStatus| s.as_str()))
        .execute(&mut *self.tx)
        .await?;

        tracing::debug!(transaction_id, to = %to, rows = result.rows_affected(), "payment status update");
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
