//! Payment gateway webhook endpoint.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use serde::Serialize;
use store::Store;

use crate::state::AppState;

#[derive(Serialize)]
pub struct WebhookResponse {
    pub received: bool,
}

/// POST /webhooks/payment-gateway: always `200 {"received": true}`.
///
/// The body is read raw so malformed JSON is acknowledged too.
pub async fn payment_gateway<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    body: Bytes,
) -> Json<WebhookResponse> {
    let ack = state.webhooks.apply_payload(&body).await;
    tracing::debug!(outcome = ack.outcome.as_str(), "webhook acknowledged");
    Json(WebhookResponse {
        received: ack.received(),
    })
}
