//! Business logic services.
//!
//! Services contain the settlement logic separated from HTTP handlers and
//! from the clients of the external systems.

pub mod catalog_service;
pub mod command_service;
pub mod notification_service;
pub mod order_ledger;
pub mod order_service;
