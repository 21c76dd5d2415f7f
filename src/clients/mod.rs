//! Clients for the external systems this service coordinates.
//!
//! Each collaborator sits behind an `async_trait` so the settlement logic
//! can run against in-memory doubles in tests.

use std::time::Duration;

use crate::error::AppError;

/// CSV product sheet
pub mod catalog_source;
/// Outbound chat transport
pub mod messenger;
/// Invoice creation and webhook authentication
pub mod payment_gateway;
/// Remote reserve / finalize / release
pub mod stock_ledger;

pub use catalog_source::{CatalogSource, CsvCatalogSource, EmptyCatalogSource};
pub use messenger::{HttpRelayMessenger, LogMessenger, Messenger};
pub use payment_gateway::{MidtransGateway, PaymentGateway};
pub use stock_ledger::{HttpStockLedger, StockLedger};

/// Build the shared outbound HTTP client.
///
/// Every remote call made through it is bounded by `timeout`, so a slow
/// collaborator surfaces as a transient `AppError::Http`.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(AppError::Http)
}
