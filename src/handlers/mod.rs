//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, etc.)
//! 2. Hands it to a service
//! 3. Returns HTTP response (JSON, status code)

/// Operator endpoints
pub mod admin;
/// Liveness endpoint
pub mod health;
/// Inbound chat commands from the transport bridge
pub mod messages;
/// Payment gateway notifications
pub mod webhooks;
