//! Order assembly: the checkout unit of work.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::time::{Duration, Instant};

use chrono::Utc;
use common::{Money, OrderId, ProductId, UserId};
use domain::{AddressInput, AddressKind, Order, OrderItem, OrderStatus, Payment};
use serde::Deserialize;
use store::{CartRepository, InventoryRepository, OrderRepository, Store, StoreTransaction};

use crate::address::AddressResolver;
use crate::error::{CheckoutError, Result};
use crate::inventory::{InventoryLedger, Reservation};
use crate::payment::{NewPayment, record_payment_in};

/// Default upper bound on a single checkout transaction.
pub const DEFAULT_CHECKOUT_TIMEOUT: Duration = Duration::from_secs(10);

/// One line of a direct checkout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl LineRequest {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Where the billing address comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingAddress {
    SameAsShipping,
    Separate(AddressInput),
}

/// Everything needed to place an order.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    /// `None` for guest checkout.
    pub user_id: Option<UserId>,
    pub email: Option<String>,
    pub shipping_address: AddressInput,
    pub billing_address: BillingAddress,
    /// Explicit lines take precedence over the cart when non-empty.
    pub items: Option<Vec<LineRequest>>,
    pub shipping_method: Option<String>,
    pub customer_notes: Option<String>,
    pub payment: Option<NewPayment>,
}

impl CheckoutRequest {
    /// Creates a cart checkout for an authenticated user.
    pub fn for_user(user_id: UserId, shipping_address: AddressInput) -> Self {
        Self {
            user_id: Some(user_id),
            email: None,
            shipping_address,
            billing_address: BillingAddress::SameAsShipping,
            items: None,
            shipping_method: None,
            customer_notes: None,
            payment: None,
        }
    }

    /// Creates a guest checkout; guests must list their items explicitly.
    pub fn for_guest(
        email: impl Into<String>,
        shipping_address: AddressInput,
        items: Vec<LineRequest>,
    ) -> Self {
        Self {
            user_id: None,
            email: Some(email.into()),
            shipping_address,
            billing_address: BillingAddress::SameAsShipping,
            items: Some(items),
            shipping_method: None,
            customer_notes: None,
            payment: None,
        }
    }

    pub fn with_items(mut self, items: Vec<LineRequest>) -> Self {
        self.items = Some(items);
        self
    }

    pub fn with_billing_address(mut self, billing_address: AddressInput) -> Self {
        self.billing_address = BillingAddress::Separate(billing_address);
        self
    }

    pub fn with_payment(mut self, payment: NewPayment) -> Self {
        self.payment = Some(payment);
        self
    }

    pub fn with_shipping_method(mut self, method: impl Into<String>) -> Self {
        self.shipping_method = Some(method.into());
        self
    }

    pub fn with_customer_notes(mut self, notes: impl Into<String>) -> Self {
        self.customer_notes = Some(notes.into());
        self
    }

    fn explicit_items(&self) -> Option<&[LineRequest]> {
        self.items.as_deref().filter(|items| !items.is_empty())
    }

    /// Input checks that need no store access.
    fn validate(&self) -> Result<()> {
        if self.user_id.is_none() {
            let email = self.email.as_deref().map(str::trim).unwrap_or_default();
            if email.is_empty() {
                return Err(CheckoutError::Validation(
                    "email is required for guest checkout".to_string(),
                ));
            }
        }

        if let Some(email) = self.email.as_deref()
            && !email.trim().is_empty()
            && !email.contains('@')
        {
            return Err(CheckoutError::Validation(format!(
                "'{email}' is not a valid email address"
            )));
        }

        if let Some(items) = self.explicit_items()
            && let Some(position) = items.iter().position(|line| line.quantity == 0)
        {
            return Err(CheckoutError::Validation(format!(
                "line {} has quantity 0; quantity must be at least 1",
                position + 1
            )));
        }

        if let Some(payment) = &self.payment {
            payment.validate()?;
        }

        Ok(())
    }
}

/// The result of a successful checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutReceipt {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payment: Option<Payment>,
}

#[derive(Debug, Clone, Copy)]
struct PricedLine {
    product_id: ProductId,
    quantity: u32,
    unit_price: Money,
}

/// Converts carts and item lists into persisted orders.
///
/// All steps of a checkout run in one store transaction: addresses,
/// stock reservations, the order and its lines, an optional payment and the
/// cart clear either all commit or none do.
pub struct OrderAssembler<S: Store> {
    store: S,
    inventory: InventoryLedger,
    addresses: AddressResolver,
    timeout: Duration,
}

impl<S: Store> OrderAssembler<S> {
    /// Creates a new assembler over the given store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            inventory: InventoryLedger::new(),
            addresses: AddressResolver::new(),
            timeout: DEFAULT_CHECKOUT_TIMEOUT,
        }
    }

    /// Sets the upper bound on a checkout transaction.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Places an order.
    ///
    /// On any failure the transaction is rolled back: no order, no lines, no
    /// stock change and no cart change survive.
    #[tracing::instrument(
        skip(self, request),
        fields(user_id = ?request.user_id, direct = request.explicit_items().is_some())
    )]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutReceipt> {
        metrics::counter!("checkout_attempts_total").increment(1);
        let started = Instant::now();

        let result = match tokio::time::timeout(self.timeout, self.run_checkout(request)).await
        {
            Ok(result) => result,
            Err(_) => Err(CheckoutError::Timeout(self.timeout)),
        };

        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        match &result {
            Ok(receipt) => {
                tracing::info!(
                    order_id = %receipt.order.id,
                    total = %receipt.order.total_amount,
                    status = %receipt.order.status,
                    lines = receipt.items.len(),
                    "checkout completed"
                );
            }
            Err(err) => {
                metrics::counter!("checkout_failures_total", "reason" => err.reason())
                    .increment(1);
                tracing::warn!(error = %err, "checkout failed");
            }
        }

        result
    }

    async fn run_checkout(&self, request: CheckoutRequest) -> Result<CheckoutReceipt> {
        request.validate()?;

        let mut tx = self.store.begin().await?;
        match self.assemble(&mut tx, request).await {
            Ok(receipt) => {
                tx.commit().await?;
                Ok(receipt)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, "checkout rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn assemble(&self, tx: &mut S::Tx, request: CheckoutRequest) -> Result<CheckoutReceipt> {
        let owner = request.user_id;

        // 1. Addresses
        let shipping_address_id = self
            .addresses
            .resolve(tx, owner, &request.shipping_address, AddressKind::Shipping)
            .await?;
        let billing_address_id = match &request.billing_address {
            BillingAddress::SameAsShipping => shipping_address_id,
            BillingAddress::Separate(input) => {
                self.addresses
                    .resolve(tx, owner, input, AddressKind::Billing)
                    .await?
            }
        };

        // 2. Item set
        let (lines, from_cart) = match request.explicit_items() {
            Some(items) => (price_explicit_lines(tx, items).await?, false),
            None => match owner {
                Some(user_id) => (cart_lines(tx, user_id).await?, true),
                None => (Vec::new(), false),
            },
        };
        if lines.is_empty() {
            return Err(CheckoutError::EmptyOrder);
        }

        // 3. Lines and total
        let order_id = OrderId::new();
        let items: Vec<OrderItem> = lines
            .iter()
            .map(|line| OrderItem::new(order_id, line.product_id, line.quantity, line.unit_price))
            .collect();
        let total_amount = OrderItem::total_of(&items)?;

        // 4. Reservations, in product id order
        let mut shortfall: Option<PlannedReservation> = None;
        for planned in reservation_plan(&items)? {
            let reservation = self
                .inventory
                .reserve(tx, planned.product_id, planned.quantity)
                .await?;
            if reservation == Reservation::InsufficientStock
                && shortfall.is_none_or(|first| planned.line < first.line)
            {
                shortfall = Some(planned);
            }
        }
        if let Some(planned) = shortfall {
            let product_name = tx
                .product(planned.product_id)
                .await?
                .map(|p| p.name)
                .unwrap_or_else(|| "unknown product".to_string());
            return Err(CheckoutError::InsufficientStock {
                product_id: planned.product_id,
                product_name,
                line: planned.line,
                requested: planned.quantity,
            });
        }

        // 5. Order and lines
        let mut order = Order {
            id: order_id,
            user_id: owner,
            status: OrderStatus::PendingPayment,
            total_amount,
            shipping_address_id,
            billing_address_id,
            shipping_method: request.shipping_method,
            tracking_number: None,
            customer_notes: request.customer_notes,
            email: request.email,
            created_at: Utc::now(),
        };
        tx.insert_order(&order).await?;
        tx.insert_order_items(&items).await?;

        // 6. Inline payment
        let payment = match request.payment {
            Some(payment) => {
                let recorded = record_payment_in(tx, order_id, payment).await?;
                order.status = recorded.order_status;
                Some(recorded.payment)
            }
            None => None,
        };

        // 7. Cart clear, last
        if from_cart && let Some(user_id) = owner {
            tx.clear_cart(user_id).await?;
        }

        Ok(CheckoutReceipt {
            order,
            items,
            payment,
        })
    }
}

/// Stock to reserve for one product across all of its lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PlannedReservation {
    product_id: ProductId,
    quantity: u32,
    /// 1-based position of the first line naming the product.
    line: usize,
}

/// Merges lines per product and orders them by product id.
///
/// Every checkout takes its product row locks in the same order, so two
/// checkouts over the same products can wait on each other but never deadlock.
fn reservation_plan(items: &[OrderItem]) -> Result<Vec<PlannedReservation>> {
    let mut plan: BTreeMap<ProductId, PlannedReservation> = BTreeMap::new();
    for (index, item) in items.iter().enumerate() {
        match plan.entry(item.product_id) {
            Entry::Vacant(entry) => {
                entry.insert(PlannedReservation {
                    product_id: item.product_id,
                    quantity: item.quantity,
                    line: index + 1,
                });
            }
            Entry::Occupied(mut entry) => {
                let planned = entry.get_mut();
                planned.quantity = planned.quantity.checked_add(item.quantity).ok_or_else(|| {
                    CheckoutError::Validation(format!(
                        "combined quantity for product {} is too large",
                        item.product_id
                    ))
                })?;
            }
        }
    }
    Ok(plan.into_values().collect())
}

/// Prices explicit lines at the product's current price.
async fn price_explicit_lines<T: InventoryRepository>(
    tx: &mut T,
    items: &[LineRequest],
) -> Result<Vec<PricedLine>> {
    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        let product = tx
            .product(item.product_id)
            .await?
            .ok_or_else(|| CheckoutError::not_found("Product", item.product_id))?;
        lines.push(PricedLine {
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: product.price,
        });
    }
    Ok(lines)
}

/// Prices cart lines at the price captured when they were added.
async fn cart_lines<T: CartRepository>(tx: &mut T, user_id: UserId) -> Result<Vec<PricedLine>> {
    let lines = tx.cart_lines(user_id).await?;
    lines
        .into_iter()
        .enumerate()
        .map(|(index, line)| {
            if line.quantity == 0 {
                return Err(CheckoutError::Validation(format!(
                    "cart line {} has quantity 0",
                    index + 1
                )));
            }
            Ok(PricedLine {
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: line.price_at_addition,
            })
        })
        .collect()
}
