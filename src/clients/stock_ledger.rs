//! Stock ledger client.
//!
//! The ledger is an external inventory service reached with one JSON POST
//! per operation. This client never retries. It relies on the remote side
//! deduplicating every operation by `order_id`, which is what makes
//! `finalize` and `release` safe to repeat after a failure.

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::stock::{StockAction, StockOperationResult, StockRequest};

/// Reserve, finalize and release stock for an order.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Tentatively hold `qty` units of `code` for `order_id`.
    ///
    /// `ok: false` is a business rejection (insufficient stock) unless the
    /// result is marked `unavailable`.
    async fn reserve(
        &self,
        order_id: &str,
        code: &str,
        qty: u32,
        buyer_ref: &str,
    ) -> Result<StockOperationResult, AppError>;

    /// Commit the hold as a sale and return the delivered items.
    async fn finalize(&self, order_id: &str, total: u64) -> Result<StockOperationResult, AppError>;

    /// Undo the hold.
    async fn release(&self, order_id: &str) -> Result<StockOperationResult, AppError>;
}

/// HTTP implementation of [`StockLedger`].
///
/// The shared secret travels in the request body, separate from any payment
/// credential.
#[derive(Debug, Clone)]
pub struct HttpStockLedger {
    client: reqwest::Client,
    endpoint: Option<String>,
    secret: String,
}

impl HttpStockLedger {
    /// A `None` endpoint turns every call into `{ok: false}` marked unavailable.
    pub fn new(client: reqwest::Client, endpoint: Option<String>, secret: String) -> Self {
        Self {
            client,
            endpoint,
            secret,
        }
    }

    async fn call(&self, action: StockAction<'_>) -> Result<StockOperationResult, AppError> {
        let Some(endpoint) = self.endpoint.as_deref() else {
            tracing::warn!(action = action.name(), "stock ledger endpoint not configured");
            return Ok(StockOperationResult::unavailable(
                "stock ledger endpoint not configured",
            ));
        };

        let name = action.name();
        let request = StockRequest {
            secret: &self.secret,
            action,
        };

        let response = self.client.post(endpoint).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Upstream(format!(
                "stock ledger {name} returned {status}"
            )));
        }

        let result: StockOperationResult = response.json().await?;
        tracing::debug!(action = name, ok = result.ok, items = result.items.len(), "stock ledger answered");
        Ok(result)
    }
}

#[async_trait]
impl StockLedger for HttpStockLedger {
    async fn reserve(
        &self,
        order_id: &str,
        code: &str,
        qty: u32,
        buyer_ref: &str,
    ) -> Result<StockOperationResult, AppError> {
        self.call(StockAction::Reserve {
            kode: code,
            qty,
            order_id,
            buyer_jid: buyer_ref,
        })
        .await
    }

    async fn finalize(&self, order_id: &str, total: u64) -> Result<StockOperationResult, AppError> {
        self.call(StockAction::Finalize { order_id, total }).await
    }

    async fn release(&self, order_id: &str) -> Result<StockOperationResult, AppError> {
        self.call(StockAction::Release { order_id }).await
    }
}
