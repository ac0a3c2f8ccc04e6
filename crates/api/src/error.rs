//! API error types with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// The caller may not access the resource.
    Forbidden(String),
    /// Checkout, payment or status update failure.
    Checkout(CheckoutError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Checkout(err) => checkout_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, String) {
    match &err {
        CheckoutError::Validation(_)
        | CheckoutError::InsufficientStock { .. }
        | CheckoutError::InvalidAddress(_)
        | CheckoutError::EmptyOrder => (StatusCode::BAD_REQUEST, err.to_string()),
        CheckoutError::Forbidden(_) => (StatusCode::FORBIDDEN, err.to_string()),
        CheckoutError::NotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
        CheckoutError::InvalidTransition { .. } => (StatusCode::CONFLICT, err.to_string()),
        CheckoutError::Timeout(_) | CheckoutError::Persistence(_) => {
            tracing::error!(error = %err, "checkout persistence failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "The order could not be saved, please retry".to_string(),
            )
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
