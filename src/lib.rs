//! Chat order settlement service.
//!
//! Buyers order catalog items over a chat transport and pay through a
//! payment gateway, while stock is held in an external ledger. This crate
//! coordinates the three external systems through an at-least-once webhook
//! protocol so that stock is never sold twice, payments are never
//! fulfilled twice, and each buyer is told about each outcome once.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (webhooks, chat bridge, operator endpoints)
//! - **External Systems**: reqwest clients behind `async_trait` seams
//! - **Order State**: in-memory ledger with an optional PostgreSQL journal
//! - **Authentication**: SHA-512 webhook signatures, SHA-256 hashed admin
//!   and bridge keys

pub mod clients;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::clients::{
    CatalogSource, CsvCatalogSource, EmptyCatalogSource, HttpRelayMessenger, HttpStockLedger,
    LogMessenger, Messenger, MidtransGateway, http_client,
};
use crate::config::Config;
use crate::db::DbPool;
use crate::error::AppError;
use crate::services::catalog_service::CatalogCache;
use crate::services::command_service::CommandService;
use crate::services::notification_service::NotificationService;
use crate::services::order_ledger::OrderLedger;
use crate::services::order_service::{OrderService, OrderSettings};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogCache>,
    pub orders: Arc<OrderService>,
    pub commands: Arc<CommandService>,
    pub notifier: Arc<NotificationService>,
    /// SHA-256 hex of `ADMIN_API_KEY`; `None` disables the admin routes
    pub admin_key_hash: Option<String>,
    /// SHA-256 hex of `BRIDGE_API_KEY`; `None` refuses inbound chat
    pub bridge_key_hash: Option<String>,
}

/// Wire the real clients from configuration.
///
/// The optional journal pool is handed to the order ledger; restoring open
/// orders from it is left to the caller.
pub fn build_state(config: &Config, pool: Option<DbPool>) -> Result<AppState, AppError> {
    let client = http_client(config.http_timeout())?;

    let source: Arc<dyn CatalogSource> = match &config.catalog_url {
        Some(url) => Arc::new(CsvCatalogSource::new(client.clone(), url.clone())),
        None => {
            tracing::warn!("CATALOG_URL not set, catalog will be empty");
            Arc::new(EmptyCatalogSource)
        }
    };
    let catalog = Arc::new(CatalogCache::new(source, config.catalog_ttl()));

    let stock = Arc::new(HttpStockLedger::new(
        client.clone(),
        config.stock_ledger_url.clone(),
        config.stock_ledger_secret.clone(),
    ));

    let gateway = Arc::new(MidtransGateway::new(
        client.clone(),
        config.payment_server_key.clone(),
        config.payment_is_production,
        config.public_base_url.as_deref(),
    ));

    let messenger: Arc<dyn Messenger> = match &config.messenger_url {
        Some(url) => Arc::new(HttpRelayMessenger::new(client, url.clone())),
        None => Arc::new(LogMessenger),
    };
    let notifier = Arc::new(NotificationService::new(messenger, config.message_max_len));

    let ledger = Arc::new(OrderLedger::new(pool));

    let settings = OrderSettings {
        order_id_prefix: config.order_id_prefix.clone(),
        invoice_mode: config.payment_mode,
        reservation_timeout: config.reservation_timeout(),
        terminal_retention: config.terminal_retention(),
        claim_timeout: config.claim_timeout(),
    };

    let orders = Arc::new(OrderService::new(
        catalog.clone(),
        stock,
        gateway,
        ledger,
        notifier.clone(),
        settings,
    ));

    let commands = Arc::new(CommandService::new(
        catalog.clone(),
        orders.clone(),
        config.admin_ids(),
        config.admin_contact.clone(),
    ));

    let bridge_key_hash = configured_key_hash(config.bridge_api_key.as_deref());
    if bridge_key_hash.is_none() {
        tracing::warn!("BRIDGE_API_KEY not set, inbound chat messages will be refused");
    }

    Ok(AppState {
        catalog,
        orders,
        commands,
        notifier,
        admin_key_hash: configured_key_hash(config.admin_api_key.as_deref()),
        bridge_key_hash,
    })
}

fn configured_key_hash(key: Option<&str>) -> Option<String> {
    key.filter(|k| !k.is_empty())
        .map(middleware::auth::hash_api_key)
}

/// Build the HTTP router.
pub fn create_app(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/api/v1/admin/reconcile", post(handlers::admin::reconcile))
        .route(
            "/api/v1/admin/catalog/refresh",
            post(handlers::admin::refresh_catalog),
        )
        .route(
            "/api/v1/admin/orders/{order_id}",
            get(handlers::admin::get_order),
        )
        .route(
            "/api/v1/admin/orders/{order_id}/release",
            post(handlers::admin::release_order),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::admin_auth,
        ));

    let bridge_routes = Router::new()
        .route("/api/v1/messages", post(handlers::messages::receive_message))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::bridge_auth,
        ));

    Router::new()
        // Public routes
        .route("/health", get(handlers::health::health_check))
        .route("/webhooks/payment", post(handlers::webhooks::payment_webhook))
        .route("/payments/finish", get(handlers::webhooks::payment_finish))
        .merge(bridge_routes)
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
