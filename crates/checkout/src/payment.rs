//! Synchronous payment recording.

use chrono::Utc;
use common::{Money, OrderId, PaymentId};
use domain::{OrderStatus, Payment, PaymentStatus};
use serde::Deserialize;
use store::{OrderRepository, PaymentRepository, Store, StoreError, StoreTransaction};

use crate::error::{CheckoutError, Result};

/// A payment attempt reported by the caller, e.g. a provider that confirms
/// capture inline.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewPayment {
    pub amount: Money,
    pub payment_method: String,
    pub transaction_id: String,
    pub status: PaymentStatus,
    #[serde(default)]
    pub gateway_response: Option<serde_json::Value>,
}

impl NewPayment {
    pub fn new(
        amount: Money,
        payment_method: impl Into<String>,
        transaction_id: impl Into<String>,
        status: PaymentStatus,
    ) -> Self {
        Self {
            amount,
            payment_method: payment_method.into(),
            transaction_id: transaction_id.into(),
            status,
            gateway_response: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.amount.is_positive() {
            return Err(CheckoutError::Validation(
                "payment amount must be greater than 0".to_string(),
            ));
        }
        if self.payment_method.trim().is_empty() {
            return Err(CheckoutError::Validation(
                "payment_method is required".to_string(),
            ));
        }
        if self.transaction_id.trim().is_empty() {
            return Err(CheckoutError::Validation(
                "transaction_id is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// A stored payment together with the order status after recording it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPayment {
    pub payment: Payment,
    pub order_status: OrderStatus,
}

/// Records payment attempts and keeps the order status in step.
pub struct PaymentLedger<S: Store> {
    store: S,
}

impl<S: Store> PaymentLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Records a payment against an existing order in its own transaction.
    #[tracing::instrument(skip(self, payment), fields(transaction_id = %payment.transaction_id))]
    pub async fn record_payment(
        &self,
        order_id: OrderId,
        payment: NewPayment,
    ) -> Result<RecordedPayment> {
        let mut tx = self.store.begin().await?;
        match record_payment_in(&mut tx, order_id, payment).await {
            Ok(recorded) => {
                tx.commit().await?;
                Ok(recorded)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

/// Records a payment inside an open transaction.
///
/// A `succeeded` payment moves a `pending_payment` order to `processing` as
/// part of the same write.
pub async fn record_payment_in<T>(
    tx: &mut T,
    order_id: OrderId,
    payment: NewPayment,
) -> Result<RecordedPayment>
where
    T: OrderRepository + PaymentRepository,
{
    payment.validate()?;

    let order = tx
        .order(order_id)
        .await?
        .ok_or_else(|| CheckoutError::not_found("Order", order_id))?;

    let payment = Payment {
        id: PaymentId::new(),
        order_id,
        amount: payment.amount,
        payment_method: payment.payment_method,
        transaction_id: payment.transaction_id,
        status: payment.status,
        gateway_response: payment.gateway_response,
        created_at: Utc::now(),
    };

    tx.insert_payment(&payment).await.map_err(|e| match e {
        StoreError::DuplicateTransactionId(id) => {
            CheckoutError::Validation(format!("transaction id {id} is already recorded"))
        }
        other => CheckoutError::Persistence(other),
    })?;

    let mut order_status = order.status;
    if payment.status == PaymentStatus::Succeeded
        && order.status == OrderStatus::PendingPayment
        && tx
            .transition_order_status(
                order_id,
                &[OrderStatus::PendingPayment],
                OrderStatus::Processing,
                None,
            )
            .await?
    {
        order_status = OrderStatus::Processing;
    }

    metrics::counter!("payments_recorded_total", "status" => payment.status.as_str())
        .increment(1);
    tracing::info!(
        %order_id,
        payment_id = %payment.id,
        status = %payment.status,
        order_status = %order_status,
        "payment recorded"
    );

    Ok(RecordedPayment {
        payment,
        order_status,
    })
}
