//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Validation Errors**: unknown product code, non-positive quantity, malformed requests
/// - **Business Rejection**: insufficient stock at the ledger
/// - **Authentication Errors**: bad webhook signature, invalid operator key
/// - **Infrastructure Errors**: catalog, ledger, gateway or database failures
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Product code does not resolve in the catalog.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Product not found")]
    ProductNotFound,

    /// The catalog row has no usable price.
    ///
    /// Returns HTTP 422 Unprocessable Entity.
    #[error("Product has no price")]
    ProductUnpriced,

    /// Quantity is zero or not a number.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    /// The stock ledger refused the reservation.
    ///
    /// Returns HTTP 422 Unprocessable Entity.
    #[error("Insufficient stock")]
    InsufficientStock,

    /// The stock ledger endpoint is not configured.
    ///
    /// Returns HTTP 503 Service Unavailable.
    #[error("Stock ledger unavailable")]
    StockLedgerUnavailable,

    /// Webhook signature does not match the recomputed digest.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Operator API key is missing or wrong.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Order not found")]
    OrderNotFound,

    /// Requested state change is not allowed from the order's current state.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("Invalid order transition: {0}")]
    InvalidTransition(String),

    /// A remote collaborator answered with an error or an unusable body.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// A remote call failed at the transport level (connect, timeout, decode).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Order journal operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    /// The String contains details about what was invalid.
    #[error("Invalid request")]
    InvalidRequest(String),
}

impl AppError {
    /// Short, non-technical text shown to a buyer when a purchase fails.
    pub fn buyer_message(&self) -> &'static str {
        match self {
            AppError::ProductNotFound => "Product code not found. Example: #buynow code 1",
            AppError::InvalidQuantity => "Quantity must be a whole number of at least 1.",
            AppError::ProductUnpriced => {
                "This product cannot be ordered right now. Please contact the admin."
            }
            AppError::InsufficientStock => {
                "Sorry, there is not enough stock. Try a smaller quantity or another product."
            }
            AppError::StockLedgerUnavailable => {
                "Ordering is temporarily unavailable. Please try again later."
            }
            _ => "Something went wrong while creating your order. Please try again shortly.",
        }
    }

    /// True for failures of a remote system rather than of the request itself.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            AppError::Upstream(_)
                | AppError::Http(_)
                | AppError::Database(_)
                | AppError::StockLedgerUnavailable
        )
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// Infrastructure errors are reported as `internal_error` / `upstream_error`
/// without their details.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::ProductNotFound => {
                (StatusCode::NOT_FOUND, "product_not_found", self.to_string())
            }
            AppError::InvalidQuantity => {
                (StatusCode::BAD_REQUEST, "invalid_quantity", self.to_string())
            }
            AppError::ProductUnpriced => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "product_unpriced",
                self.to_string(),
            ),
            AppError::InsufficientStock => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "insufficient_stock",
                self.to_string(),
            ),
            AppError::StockLedgerUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                self.to_string(),
            ),
            AppError::InvalidSignature => (
                StatusCode::UNAUTHORIZED,
                "invalid_signature",
                self.to_string(),
            ),
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "invalid_api_key",
                self.to_string(),
            ),
            AppError::OrderNotFound => (StatusCode::NOT_FOUND, "order_not_found", self.to_string()),
            AppError::InvalidTransition(ref msg) => {
                (StatusCode::CONFLICT, "invalid_transition", msg.clone())
            }
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::Upstream(_) | AppError::Http(_) => (
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                "An upstream service failed".to_string(),
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred".to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
