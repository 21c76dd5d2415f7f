//! HTTP handlers for payment gateway notifications.
//!
//! The gateway retries any non-2xx answer, so every authenticated event is
//! acknowledged with 200 whatever happened internally. Only a bad signature
//! gets 401.

use axum::{Json, body::Bytes, extract::State};
use serde::Serialize;

use crate::AppState;
use crate::error::AppError;
use crate::models::payment::PaymentEvent;
use crate::services::order_service::SettlementOutcome;

/// Acknowledgement body.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
    pub outcome: SettlementOutcome,
}

/// Receive a payment notification.
///
/// # Request Body
///
/// ```json
/// {
///   "order_id": "ORD-1734700000000-1a2b3c4d",
///   "status_code": "200",
///   "transaction_status": "settlement",
///   "gross_amount": "20000.00",
///   "payment_type": "qris",
///   "signature_key": "<sha512 hex>"
/// }
/// ```
///
/// # Response (200)
///
/// ```json
/// { "status": "ok", "outcome": "settled" }
/// ```
///
/// # Errors
///
/// - 401 `invalid_signature`: signature mismatch, nothing changed
/// - 400 `invalid_request`: body is not a payment notification
pub async fn payment_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let event: PaymentEvent = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!("unparseable payment webhook: {}", e);
        AppError::InvalidRequest(format!("Invalid webhook payload: {e}"))
    })?;

    let outcome = state.orders.handle_payment_event(&event).await?;

    Ok(Json(WebhookAck {
        status: "ok",
        outcome,
    }))
}

/// Landing page for the gateway's finish redirect.
pub async fn payment_finish() -> &'static str {
    "Thank you! Check your chat for the payment confirmation and your items."
}
