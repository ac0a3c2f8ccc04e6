//! Checkout, order lookup, payment and status endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::{BillingAddress, CheckoutRequest, LineRequest, NewPayment, OrderDetails};
use common::{Money, OrderId};
use domain::{AddressInput, OrderStatus, Payment};
use serde::{Deserialize, Serialize};
use store::Store;

use crate::caller::Caller;
use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub shipping_address: AddressInput,
    #[serde(default)]
    pub billing_address: Option<AddressInput>,
    #[serde(default)]
    pub same_as_shipping: Option<bool>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub items: Option<Vec<LineRequest>>,
    #[serde(default)]
    pub shipping_method: Option<String>,
    #[serde(default)]
    pub customer_notes: Option<String>,
    #[serde(default)]
    pub payment: Option<NewPayment>,
}

impl CreateOrderRequest {
    fn into_checkout(self, caller: Caller) -> Result<CheckoutRequest, ApiError> {
        let billing_address = match (self.same_as_shipping, self.billing_address) {
            (Some(true), _) | (None, None) => BillingAddress::SameAsShipping,
            (_, Some(input)) => BillingAddress::Separate(input),
            (Some(false), None) => {
                return Err(ApiError::BadRequest(
                    "billing_address is required unless same_as_shipping is set".to_string(),
                ));
            }
        };

        Ok(CheckoutRequest {
            user_id: caller.user_id,
            email: self.email,
            shipping_address: self.shipping_address,
            billing_address,
            items: self.items,
            shipping_method: self.shipping_method,
            customer_notes: self.customer_notes,
            payment: self.payment,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderCreatedResponse {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub total_amount: Money,
}

#[derive(Serialize)]
pub struct PaymentRecordedResponse {
    #[serde(flatten)]
    pub payment: Payment,
    pub order_status: OrderStatus,
}

#[derive(Serialize)]
pub struct StatusUpdatedResponse {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub tracking_number: Option<String>,
}

// -- Handlers --

/// POST /orders: checkout from the caller's cart or an explicit item list.
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError> {
    let Json(req) = payload?;
    let receipt = state.assembler.checkout(req.into_checkout(caller)?).await?;

    Ok((
        StatusCode::CREATED,
        Json(OrderCreatedResponse {
            order_id: receipt.order.id,
            status: receipt.order.status,
            total_amount: receipt.order.total_amount,
        }),
    ))
}

/// GET /orders/{id}: order with items and payments, for its owner or an admin.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<OrderDetails>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let details = state.orders.order_details(order_id).await?;
    ensure_access(&caller, &details)?;
    Ok(Json(details))
}

/// POST /orders/{id}/payments: record a payment attempt.
#[tracing::instrument(skip(state, payload))]
pub async fn record_payment<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
    payload: Result<Json<NewPayment>, JsonRejection>,
) -> Result<(StatusCode, Json<PaymentRecordedResponse>), ApiError> {
    let order_id = parse_order_id(&id)?;
    let Json(payment) = payload?;

    let details = state.orders.order_details(order_id).await?;
    ensure_access(&caller, &details)?;

    let recorded = state.payments.record_payment(order_id, payment).await?;
    Ok((
        StatusCode::CREATED,
        Json(PaymentRecordedResponse {
            payment: recorded.payment,
            order_status: recorded.order_status,
        }),
    ))
}

/// PUT /orders/{id}/status: admin-only status change.
#[tracing::instrument(skip(state, payload))]
pub async fn update_status<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<StatusUpdatedResponse>, ApiError> {
    if !caller.is_admin {
        return Err(ApiError::Forbidden(
            "Only administrators can change order status".to_string(),
        ));
    }
    let order_id = parse_order_id(&id)?;
    let Json(req) = payload?;

    let order = state
        .orders
        .update_status(order_id, &req.status, req.tracking_number)
        .await?;

    Ok(Json(StatusUpdatedResponse {
        order_id: order.id,
        status: order.status,
        tracking_number: order.tracking_number,
    }))
}

fn ensure_access(caller: &Caller, details: &OrderDetails) -> Result<(), ApiError> {
    if caller.can_access(&details.order) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "Order {} is not accessible to the caller",
            details.order.id
        )))
    }
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}
