//! Data models for orders, catalog products and the wire formats of the
//! external collaborators.

/// Catalog product and row mapping
pub mod product;
/// Order and its lifecycle states
pub mod order;
/// Payment webhook events and invoices
pub mod payment;
/// Stock ledger requests and results
pub mod stock;
