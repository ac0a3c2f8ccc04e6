//! HTTP route handlers.

use axum::http::Uri;

use crate::error::ApiError;

pub mod health;
pub mod metrics;
pub mod orders;
pub mod webhooks;

/// Fallback for paths no route matches.
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("No route for {}", uri.path()))
}
