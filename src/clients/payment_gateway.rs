//! Payment gateway client (Midtrans).
//!
//! Two invoice modes are supported:
//! - **Redirect**: Snap hosted checkout, `POST {snap}/snap/v1/transactions`
//! - **Qr**: Core API QRIS charge, `POST {core}/v2/charge`
//!
//! Both authenticate with HTTP Basic, username = server key, empty password.
//! The production or sandbox hosts are chosen once at construction.
//!
//! # Webhook Authentication
//!
//! Each notification carries `signature_key`:
//!
//! ```text
//! hex(SHA-512(order_id + status_code + gross_amount + server_key))
//! ```
//!
//! computed over the fields exactly as received.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha512};

use crate::error::AppError;
use crate::models::payment::{Invoice, InvoiceMode, InvoiceRequest, PaymentEvent};

const SNAP_PRODUCTION: &str = "https://app.midtrans.com";
const SNAP_SANDBOX: &str = "https://app.sandbox.midtrans.com";
const CORE_PRODUCTION: &str = "https://api.midtrans.com";
const CORE_SANDBOX: &str = "https://api.sandbox.midtrans.com";

/// Gateway item names are limited to 50 characters.
const MAX_ITEM_NAME: usize = 50;

/// Create invoices and authenticate webhooks.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open an invoice for `request.gross_amount` in the given mode.
    async fn create_invoice(
        &self,
        request: &InvoiceRequest,
        mode: InvoiceMode,
    ) -> Result<Invoice, AppError>;

    /// True when the event's signature matches the recomputed digest.
    fn verify_webhook_signature(&self, event: &PaymentEvent) -> bool;
}

/// Compute the expected webhook signature.
pub fn webhook_signature(
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    server_key: &str,
) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify a webhook event against `server_key`.
///
/// An empty server key never verifies.
pub fn verify_signature(event: &PaymentEvent, server_key: &str) -> bool {
    if server_key.is_empty() || event.signature.is_empty() {
        return false;
    }
    let expected = webhook_signature(
        &event.order_id,
        &event.status_code,
        &event.gross_amount,
        server_key,
    );
    constant_time_eq(expected.as_bytes(), event.signature.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}

#[derive(Debug, Deserialize)]
struct SnapResponse {
    token: Option<String>,
    redirect_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChargeAction {
    name: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChargeResponse {
    status_code: Option<String>,
    status_message: Option<String>,
    qr_string: Option<String>,
    #[serde(default)]
    actions: Vec<ChargeAction>,
}

/// Midtrans implementation of [`PaymentGateway`].
#[derive(Debug, Clone)]
pub struct MidtransGateway {
    client: reqwest::Client,
    server_key: String,
    snap_base: String,
    core_base: String,
    finish_url: Option<String>,
}

impl MidtransGateway {
    pub fn new(
        client: reqwest::Client,
        server_key: String,
        is_production: bool,
        public_base_url: Option<&str>,
    ) -> Self {
        let (snap_base, core_base) = if is_production {
            (SNAP_PRODUCTION, CORE_PRODUCTION)
        } else {
            (SNAP_SANDBOX, CORE_SANDBOX)
        };
        Self {
            client,
            server_key,
            snap_base: snap_base.to_string(),
            core_base: core_base.to_string(),
            finish_url: public_base_url
                .map(|base| format!("{}/payments/finish", base.trim_end_matches('/'))),
        }
    }

    fn authorization(&self) -> String {
        let credentials = general_purpose::STANDARD.encode(format!("{}:", self.server_key));
        format!("Basic {credentials}")
    }

    fn base_payload(request: &InvoiceRequest) -> serde_json::Value {
        let name: String = request.product_label.chars().take(MAX_ITEM_NAME).collect();
        json!({
            "transaction_details": {
                "order_id": request.order_id,
                "gross_amount": request.gross_amount,
            },
            "item_details": [{
                "id": request.order_id,
                "price": request.gross_amount,
                "quantity": 1,
                "name": name,
            }],
            "customer_details": { "phone": request.buyer_contact },
        })
    }

    async fn post(&self, url: &str, payload: &serde_json::Value) -> Result<reqwest::Response, AppError> {
        let response = self
            .client
            .post(url)
            .header("Accept", "application/json")
            .header("Authorization", self.authorization())
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "payment gateway returned {status}: {body}"
            )));
        }
        Ok(response)
    }

    async fn create_redirect(&self, request: &InvoiceRequest) -> Result<Invoice, AppError> {
        let mut payload = Self::base_payload(request);
        payload["credit_card"] = json!({ "secure": true });
        payload["expiry"] = json!({ "unit": "minutes", "duration": request.expiry_minutes });
        if let Some(finish) = &self.finish_url {
            payload["callbacks"] = json!({ "finish": finish });
        }

        let url = format!("{}/snap/v1/transactions", self.snap_base);
        let snap: SnapResponse = self.post(&url, &payload).await?.json().await?;

        let checkout_url = snap
            .redirect_url
            .ok_or_else(|| AppError::Upstream("snap response has no redirect_url".to_string()))?;

        Ok(Invoice {
            mode: InvoiceMode::Redirect,
            token: snap.token,
            checkout_url: Some(checkout_url),
            qr_payload: None,
        })
    }

    async fn create_qr(&self, request: &InvoiceRequest) -> Result<Invoice, AppError> {
        let mut payload = Self::base_payload(request);
        payload["payment_type"] = json!("qris");
        payload["custom_expiry"] = json!({
            "expiry_duration": request.expiry_minutes,
            "unit": "minute",
        });

        let url = format!("{}/v2/charge", self.core_base);
        let charge: ChargeResponse = self.post(&url, &payload).await?.json().await?;

        // Core API reports failures in the body with an HTTP 200.
        if let Some(code) = charge.status_code.as_deref() {
            if !code.starts_with('2') {
                return Err(AppError::Upstream(format!(
                    "qr charge failed with {code}: {}",
                    charge.status_message.unwrap_or_default()
                )));
            }
        }

        let qr_payload = charge
            .qr_string
            .ok_or_else(|| AppError::Upstream("charge response has no qr_string".to_string()))?;
        let checkout_url = charge
            .actions
            .into_iter()
            .find(|a| a.name == "generate-qr-code")
            .map(|a| a.url);

        Ok(Invoice {
            mode: InvoiceMode::Qr,
            token: None,
            checkout_url,
            qr_payload: Some(qr_payload),
        })
    }
}

#[async_trait]
impl PaymentGateway for MidtransGateway {
    async fn create_invoice(
        &self,
        request: &InvoiceRequest,
        mode: InvoiceMode,
    ) -> Result<Invoice, AppError> {
        match mode {
            InvoiceMode::Redirect => self.create_redirect(request).await,
            InvoiceMode::Qr => self.create_qr(request).await,
        }
    }

    fn verify_webhook_signature(&self, event: &PaymentEvent) -> bool {
        verify_signature(event, &self.server_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::payment::TransactionStatus;

    fn event(gross_amount: &str, signature: String) -> PaymentEvent {
        PaymentEvent {
            order_id: "ORD-1".to_string(),
            status_code: "200".to_string(),
            transaction_status: TransactionStatus::Settlement,
            gross_amount: gross_amount.to_string(),
            payment_type: "qris".to_string(),
            signature,
        }
    }

    #[test]
    fn signature_is_sha512_hex_of_concatenation() {
        let expected = {
            let mut hasher = Sha512::new();
            hasher.update(b"ORD-120020000.00server-key");
            hex::encode(hasher.finalize())
        };
        assert_eq!(
            webhook_signature("ORD-1", "200", "20000.00", "server-key"),
            expected
        );
        assert_eq!(expected.len(), 128);
    }

    #[test]
    fn valid_signature_verifies() {
        let sig = webhook_signature("ORD-1", "200", "20000.00", "server-key");
        assert!(verify_signature(&event("20000.00", sig), "server-key"));
    }

    #[test]
    fn tampered_amount_is_rejected() {
        let sig = webhook_signature("ORD-1", "200", "20000.00", "server-key");
        assert!(!verify_signature(&event("20001.00", sig), "server-key"));
    }

    #[test]
    fn amount_is_not_reserialized() {
        let sig = webhook_signature("ORD-1", "200", "20000.00", "server-key");
        assert!(!verify_signature(&event("20000", sig), "server-key"));
    }

    #[test]
    fn wrong_key_or_empty_signature_is_rejected() {
        let sig = webhook_signature("ORD-1", "200", "20000.00", "other-key");
        assert!(!verify_signature(&event("20000.00", sig), "server-key"));
        assert!(!verify_signature(&event("20000.00", String::new()), "server-key"));
        assert!(!verify_signature(&event("20000.00", "abc".to_string()), ""));
    }

    #[test]
    fn basic_auth_uses_key_with_empty_password() {
        let gateway = MidtransGateway::new(
            reqwest::Client::new(),
            "SB-Mid-server-abc".to_string(),
            false,
            Some("https://bot.example/"),
        );
        assert_eq!(
            gateway.authorization(),
            format!(
                "Basic {}",
                general_purpose::STANDARD.encode("SB-Mid-server-abc:")
            )
        );
        assert_eq!(gateway.snap_base, SNAP_SANDBOX);
        assert_eq!(
            gateway.finish_url.as_deref(),
            Some("https://bot.example/payments/finish")
        );
    }
}
