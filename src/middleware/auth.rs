//! Bearer key authentication middleware.
//!
//! Guards the `/api/v1/admin` routes and the chat bridge route:
//! 1. Extract the key from the Authorization header
//! 2. Hash it and compare with the hash of the configured key
//! 3. Reject unauthorized requests with HTTP 401
//!
//! Without a configured key every request to the guarded routes is rejected.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};

use crate::{AppState, error::AppError};

/// SHA-256 hex digest of an API key.
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Admin authentication middleware function.
///
/// # Headers
///
/// Expected header format:
/// ```text
/// Authorization: Bearer <ADMIN_API_KEY>
/// ```
///
/// # Returns
///
/// - `Ok(Response)` if authenticated successfully (calls next handler)
/// - `Err(AppError::InvalidApiKey)` otherwise (returns 401)
pub async fn admin_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    check_bearer(state.admin_key_hash.as_deref(), &request, "admin")?;
    Ok(next.run(request).await)
}

/// Chat bridge authentication, `Authorization: Bearer <BRIDGE_API_KEY>`.
///
/// The bridge vouches for the `sender` of every inbound message, so only it
/// may post to `/api/v1/messages`.
pub async fn bridge_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    check_bearer(state.bridge_key_hash.as_deref(), &request, "bridge")?;
    Ok(next.run(request).await)
}

fn check_bearer(expected: Option<&str>, request: &Request, route: &str) -> Result<(), AppError> {
    let expected = expected.ok_or(AppError::InvalidApiKey)?;

    let api_key = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AppError::InvalidApiKey)?;

    // Equal-length digests compared without early exit.
    let presented = hash_api_key(api_key);
    let diff = presented
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b));
    if diff != 0 || presented.len() != expected.len() {
        tracing::warn!(route, "rejected request with invalid API key");
        return Err(AppError::InvalidApiKey);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn hash_is_sha256_hex() {
        assert_eq!(
            hash_api_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    fn request(auth: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/api/v1/messages");
        if let Some(auth) = auth {
            builder = builder.header("Authorization", auth);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn bearer_must_match_the_configured_key() {
        let expected = hash_api_key("bridge-secret");

        assert!(check_bearer(Some(&expected), &request(Some("Bearer bridge-secret")), "bridge").is_ok());
        for auth in [None, Some("Bearer wrong"), Some("bridge-secret")] {
            assert!(matches!(
                check_bearer(Some(&expected), &request(auth), "bridge"),
                Err(AppError::InvalidApiKey)
            ));
        }
    }

    #[test]
    fn unconfigured_key_rejects_everything() {
        assert!(matches!(
            check_bearer(None, &request(Some("Bearer anything")), "bridge"),
            Err(AppError::InvalidApiKey)
        ));
    }
}
