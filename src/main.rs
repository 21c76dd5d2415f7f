//! Chat order settlement service - main application entry point.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Open the order journal and run migrations (when `DATABASE_URL` is set)
//! 3. Wire clients and services, restore open orders, warm the catalog
//! 4. Start the reconciliation task
//! 5. Start the HTTP server on the configured port

use std::time::Duration;

use chat_order_settlement::{build_state, config, create_app, db};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    let pool = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url).await?;
            db::run_migrations(&pool).await?;
            tracing::info!("Order journal ready");
            Some(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, orders are kept in memory only");
            None
        }
    };

    let state = build_state(&config, pool)?;

    let restored = state.orders.ledger().restore().await?;
    if restored > 0 {
        tracing::info!(restored, "open orders restored from journal");
    }

    match state.catalog.refresh(true).await {
        Ok(count) => tracing::info!(products = count, "catalog loaded"),
        Err(e) => tracing::error!("initial catalog load failed: {:?}", e),
    }

    let reconciler = state
        .orders
        .clone()
        .spawn_reconciler(Duration::from_secs(config.reconcile_interval_secs.max(1)));

    let app = create_app(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    reconciler.abort();
    Ok(())
}
