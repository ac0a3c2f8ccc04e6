//! HTTP API server for the checkout pipeline.
//!
//! Provides REST endpoints for checkout, order lookup, payment recording,
//! admin status changes and the payment gateway webhook, with structured
//! logging (tracing) and Prometheus metrics.

pub mod caller;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use caller::Caller;
pub use config::{Config, LogFormat};
pub use error::ApiError;
pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route(
            "/orders/{id}/payments",
            post(routes::orders::record_payment::<S>),
        )
        .route("/orders/{id}/status", put(routes::orders::update_status::<S>))
        .route(
            "/webhooks/payment-gateway",
            post(routes::webhooks::payment_gateway::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .fallback(routes::not_found)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over `store` with the default checkout timeout.
pub fn create_default_state<S: Store + Clone + 'static>(store: S) -> Arc<AppState<S>> {
    create_state(store, checkout::DEFAULT_CHECKOUT_TIMEOUT)
}

/// Creates the application state over `store`.
pub fn create_state<S: Store + Clone + 'static>(
    store: S,
    checkout_timeout: Duration,
) -> Arc<AppState<S>> {
    AppState::new(store, checkout_timeout).shared()
}
