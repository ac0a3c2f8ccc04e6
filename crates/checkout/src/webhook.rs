//! Payment gateway webhook reconciliation.

use domain::{OrderStatus, PaymentStatus};
use serde::Serialize;
use serde_json::Value;
use store::{OrderRepository, PaymentRepository, Store, StoreError, StoreTransaction};

/// Gateway event types this system reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEventKind {
    CaptureCompleted,
    CaptureDenied,
    CaptureRefunded,
    CaptureReversed,
    Other(String),
}

impl GatewayEventKind {
    pub fn as_str(&self) -> &str {
        match self {
            GatewayEventKind::CaptureCompleted => "PAYMENT.CAPTURE.COMPLETED",
            GatewayEventKind::CaptureDenied => "PAYMENT.CAPTURE.DENIED",
            GatewayEventKind::CaptureRefunded => "PAYMENT.CAPTURE.REFUNDED",
            GatewayEventKind::CaptureReversed => "PAYMENT.CAPTURE.REVERSED",
            GatewayEventKind::Other(other) => other,
        }
    }

    /// Bounded label for metrics.
    fn label(&self) -> &'static str {
        match self {
            GatewayEventKind::CaptureCompleted => "PAYMENT.CAPTURE.COMPLETED",
            GatewayEventKind::CaptureDenied => "PAYMENT.CAPTURE.DENIED",
            GatewayEventKind::CaptureRefunded => "PAYMENT.CAPTURE.REFUNDED",
            GatewayEventKind::CaptureReversed => "PAYMENT.CAPTURE.REVERSED",
            GatewayEventKind::Other(_) => "other",
        }
    }

    /// Target payment and order statuses for this event, if it is actionable.
    fn targets(&self) -> Option<(PaymentStatus, OrderStatus)> {
        match self {
            GatewayEventKind::CaptureCompleted => {
                Some((PaymentStatus::Succeeded, OrderStatus::Processing))
            }
            GatewayEventKind::CaptureDenied => {
                Some((PaymentStatus::Failed, OrderStatus::PaymentFailed))
            }
            GatewayEventKind::CaptureRefunded | GatewayEventKind::CaptureReversed => {
                Some((PaymentStatus::Refunded, OrderStatus::Refunded))
            }
            GatewayEventKind::Other(_) => None,
        }
    }
}

impl From<&str> for GatewayEventKind {
    fn from(s: &str) -> Self {
        match s {
            "PAYMENT.CAPTURE.COMPLETED" => GatewayEventKind::CaptureCompleted,
            "PAYMENT.CAPTURE.DENIED" => GatewayEventKind::CaptureDenied,
            "PAYMENT.CAPTURE.REFUNDED" => GatewayEventKind::CaptureRefunded,
            "PAYMENT.CAPTURE.REVERSED" => GatewayEventKind::CaptureReversed,
            other => GatewayEventKind::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for GatewayEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded gateway callback.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayEvent {
    pub kind: GatewayEventKind,
    /// The capture id, `resource.id` in the payload.
    pub transaction_id: Option<String>,
    /// The full payload, stored as the payment's gateway response.
    pub raw: Value,
}

impl GatewayEvent {
    /// Reads `event_type` and `resource.id` out of a gateway payload.
    pub fn from_json(raw: Value) -> Self {
        let kind = raw
            .get("event_type")
            .and_then(Value::as_str)
            .map(GatewayEventKind::from)
            .unwrap_or_else(|| GatewayEventKind::Other(String::new()));
        let transaction_id = raw
            .get("resource")
            .and_then(|r| r.get("id"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        Self {
            kind,
            transaction_id,
            raw,
        }
    }
}

/// What happened to an event. Never reported to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The payment (and possibly the order) moved.
    Applied,
    /// A replay: the payment is already in the target status.
    AlreadyApplied,
    /// The payment's status does not allow this event.
    Skipped,
    /// No payment carries the event's transaction id.
    UnmatchedTransaction,
    UnknownEventType,
    /// The payload could not be decoded.
    Malformed,
    /// The store failed; the change was rolled back.
    Failed,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Applied => "applied",
            ReconcileOutcome::AlreadyApplied => "already_applied",
            ReconcileOutcome::Skipped => "skipped",
            ReconcileOutcome::UnmatchedTransaction => "unmatched_transaction",
            ReconcileOutcome::UnknownEventType => "unknown_event_type",
            ReconcileOutcome::Malformed => "malformed",
            ReconcileOutcome::Failed => "failed",
        }
    }
}

/// Acknowledgement returned for every delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub outcome: ReconcileOutcome,
}

impl Ack {
    /// The gateway only ever sees a successful receipt.
    pub fn received(&self) -> bool {
        true
    }
}

/// Applies gateway events to payments and orders.
///
/// Delivery is at-least-once and may be out of order, so every change is a
/// compare-and-set on the current status and a replay is a no-op.
pub struct WebhookReconciler<S: Store> {
    store: S,
}

impl<S: Store> WebhookReconciler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Decodes a raw request body and applies it.
    pub async fn apply_payload(&self, body: &[u8]) -> Ack {
        match serde_json::from_slice::<Value>(body) {
            Ok(raw) => self.apply(GatewayEvent::from_json(raw)).await,
            Err(err) => {
                tracing::warn!(error = %err, "malformed webhook payload");
                metrics::counter!(
                    "webhook_events_total",
                    "event_type" => "unknown",
                    "outcome" => ReconcileOutcome::Malformed.as_str()
                )
                .increment(1);
                Ack {
                    outcome: ReconcileOutcome::Malformed,
                }
            }
        }
    }

    /// Applies one event. Always acknowledges.
    #[tracing::instrument(
        skip(self, event),
        fields(event_type = %event.kind, transaction_id = ?event.transaction_id)
    )]
    pub async fn apply(&self, event: GatewayEvent) -> Ack {
        let outcome = match self.reconcile(&event).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(error = %err, "webhook reconciliation failed");
                ReconcileOutcome::Failed
            }
        };

        metrics::counter!(
            "webhook_events_total",
            "event_type" => event.kind.label(),
            "outcome" => outcome.as_str()
        )
        .increment(1);

        Ack { outcome }
    }

    async fn reconcile(&self, event: &GatewayEvent) -> Result<ReconcileOutcome, StoreError> {
        let Some((payment_target, order_target)) = event.kind.targets() else {
            tracing::info!("ignoring unknown webhook event type");
            return Ok(ReconcileOutcome::UnknownEventType);
        };
        let Some(transaction_id) = event.transaction_id.as_deref() else {
            tracing::warn!("webhook event has no resource id");
            return Ok(ReconcileOutcome::Malformed);
        };

        let mut tx = self.store.begin().await?;

        let Some(payment) = tx.payment_by_transaction_id(transaction_id).await? else {
            tracing::info!("no payment for transaction id");
            tx.rollback().await?;
            return Ok(ReconcileOutcome::UnmatchedTransaction);
        };

        if payment.status == payment_target {
            tracing::debug!("event already applied");
            tx.rollback().await?;
            return Ok(ReconcileOutcome::AlreadyApplied);
        }
        if let Err(err) = payment.status.transition_to(payment_target) {
            tracing::warn!(error = %err, "payment transition not allowed");
            tx.rollback().await?;
            return Ok(ReconcileOutcome::Skipped);
        }

        let moved = tx
            .transition_payment_status(
                transaction_id,
                &PaymentStatus::predecessors_of(payment_target),
                payment_target,
                Some(&event.raw),
            )
            .await?;
        if !moved {
            let current = tx
                .payment_by_transaction_id(transaction_id)
                .await?
                .map(|p| p.status);
            tx.rollback().await?;
            if current == Some(payment_target) {
                return Ok(ReconcileOutcome::AlreadyApplied);
            }
            tracing::warn!(
                from = ?current,
                to = %payment_target,
                "payment changed concurrently, transition skipped"
            );
            return Ok(ReconcileOutcome::Skipped);
        }

        let order_moved = tx
            .transition_order_status(
                payment.order_id,
                &OrderStatus::predecessors_of(order_target),
                order_target,
                None,
            )
            .await?;
        if !order_moved {
            tracing::info!(
                order_id = %payment.order_id,
                to = %order_target,
                "order transition skipped"
            );
        }

        tx.commit().await?;

        tracing::info!(
            order_id = %payment.order_id,
            from = %payment.status,
            to = %payment_target,
            order_moved,
            "webhook applied"
        );
        Ok(ReconcileOutcome::Applied)
    }
}
