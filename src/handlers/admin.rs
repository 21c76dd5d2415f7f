//! Operator endpoints.
//!
//! These cover the manual side of reconciliation: releasing orders whose
//! invoice never materialised or whose buyer never paid, and forcing a
//! catalog reload.

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;
use crate::error::AppError;
use crate::models::order::Order;
use crate::services::order_service::{ReconcileReport, SettlementOutcome};

/// Run one reconciliation sweep now.
///
/// # Response (200)
///
/// ```json
/// { "released": ["ORD-..."], "failed": [], "purged": 4 }
/// ```
pub async fn reconcile(State(state): State<AppState>) -> Json<ReconcileReport> {
    Json(state.orders.reconcile(Utc::now()).await)
}

#[derive(Debug, Serialize)]
pub struct CatalogRefreshResponse {
    pub products: usize,
}

/// Force a catalog reload.
pub async fn refresh_catalog(
    State(state): State<AppState>,
) -> Result<Json<CatalogRefreshResponse>, AppError> {
    let products = state.catalog.refresh(true).await?;
    Ok(Json(CatalogRefreshResponse { products }))
}

/// Get an order snapshot.
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Order>, AppError> {
    state
        .orders
        .ledger()
        .get(&order_id)
        .map(Json)
        .ok_or(AppError::OrderNotFound)
}

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub order_id: String,
    pub outcome: SettlementOutcome,
}

/// Release one open order by hand.
///
/// # Errors
///
/// - 404 `order_not_found`
/// - 409 `invalid_transition`: the order is already terminal or busy
/// - 502 `upstream_error`: the stock ledger did not confirm the release
pub async fn release_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<ReleaseResponse>, AppError> {
    let outcome = state.orders.release_order(&order_id, "manual").await;
    match outcome {
        SettlementOutcome::Released => Ok(Json(ReleaseResponse { order_id, outcome })),
        SettlementOutcome::UnknownOrder => Err(AppError::OrderNotFound),
        SettlementOutcome::ReleaseFailed => Err(AppError::Upstream(
            "stock ledger did not confirm the release".to_string(),
        )),
        other => Err(AppError::InvalidTransition(format!(
            "order {order_id} cannot be released ({other:?})"
        ))),
    }
}
