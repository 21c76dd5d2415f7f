//! Payment gateway models: inbound webhook events and invoices.

use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::value::RawValue;

/// Gateway transaction status carried by a webhook.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum TransactionStatus {
    Settlement,
    Capture,
    Pending,
    Expire,
    Cancel,
    Deny,
    Other(String),
}

/// What a transaction status means for the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Funds captured; finalize stock
    Paid,
    /// Waiting for the buyer; nothing to do
    Pending,
    /// Buyer gave up or the gateway refused; release stock
    Abandoned,
    /// Statuses this service does not act on
    Unhandled,
}

impl From<String> for TransactionStatus {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "settlement" => TransactionStatus::Settlement,
            "capture" => TransactionStatus::Capture,
            "pending" => TransactionStatus::Pending,
            "expire" => TransactionStatus::Expire,
            "cancel" => TransactionStatus::Cancel,
            "deny" => TransactionStatus::Deny,
            _ => TransactionStatus::Other(value),
        }
    }
}

impl TransactionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TransactionStatus::Settlement => "settlement",
            TransactionStatus::Capture => "capture",
            TransactionStatus::Pending => "pending",
            TransactionStatus::Expire => "expire",
            TransactionStatus::Cancel => "cancel",
            TransactionStatus::Deny => "deny",
            TransactionStatus::Other(s) => s.as_str(),
        }
    }

    pub fn outcome(&self) -> PaymentOutcome {
        match self {
            TransactionStatus::Settlement | TransactionStatus::Capture => PaymentOutcome::Paid,
            TransactionStatus::Pending => PaymentOutcome::Pending,
            TransactionStatus::Expire | TransactionStatus::Cancel | TransactionStatus::Deny => {
                PaymentOutcome::Abandoned
            }
            TransactionStatus::Other(_) => PaymentOutcome::Unhandled,
        }
    }
}

/// Inbound payment webhook.
///
/// # Example
///
/// ```json
/// {
///   "order_id": "ORD-1734700000000-1a2b3c4d",
///   "status_code": "200",
///   "transaction_status": "settlement",
///   "gross_amount": "20000.00",
///   "payment_type": "qris",
///   "signature_key": "9f86d0..."
/// }
/// ```
///
/// `status_code` and `gross_amount` are kept exactly as received because the
/// signature is computed over their string form.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEvent {
    pub order_id: String,

    #[serde(default, deserialize_with = "as_received")]
    pub status_code: String,

    pub transaction_status: TransactionStatus,

    #[serde(deserialize_with = "as_received")]
    pub gross_amount: String,

    #[serde(default)]
    pub payment_type: String,

    #[serde(rename = "signature_key", default)]
    pub signature: String,
}

impl PaymentEvent {
    /// Gross amount in whole currency units.
    ///
    /// Accepts `"20000"` and `"20000.00"`; a non-zero fractional part or an
    /// unparseable value yields `None`.
    pub fn gross_amount_units(&self) -> Option<u64> {
        let raw = self.gross_amount.trim();
        let (whole, fraction) = raw.split_once('.').unwrap_or((raw, ""));
        if !fraction.chars().all(|c| c == '0') {
            return None;
        }
        whole.parse().ok()
    }
}

/// Keep a JSON string's contents, or a JSON number's literal token text
/// (`10000.00` stays `"10000.00"`).
///
/// Only works with the `serde_json` text deserializers, which hand out the
/// raw token.
fn as_received<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Box::<RawValue>::deserialize(deserializer)?;
    let token = raw.get().trim();
    match token.as_bytes().first() {
        Some(b'"') => serde_json::from_str(token).map_err(de::Error::custom),
        Some(b'-' | b'0'..=b'9') => Ok(token.to_string()),
        _ if token == "null" => Ok(String::new()),
        _ => Err(de::Error::custom(format!(
            "expected string or number, got {token}"
        ))),
    }
}

/// How the buyer is asked to pay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceMode {
    /// Hosted checkout page
    #[default]
    Redirect,
    /// Direct QR charge; falls back to `Redirect` on failure
    Qr,
}

/// Everything the gateway needs to open an invoice.
#[derive(Debug, Clone)]
pub struct InvoiceRequest {
    pub order_id: String,
    /// Whole currency units
    pub gross_amount: u64,
    pub buyer_contact: String,
    pub product_label: String,
    /// Invoice lifetime; aligned with the reservation timeout
    pub expiry_minutes: u64,
}

/// An opened invoice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invoice {
    pub mode: InvoiceMode,
    pub token: Option<String>,
    pub checkout_url: Option<String>,
    pub qr_payload: Option<String>,
}

impl Invoice {
    /// What to show the buyer: the checkout link, or the raw QR payload.
    pub fn checkout_reference(&self) -> &str {
        self.checkout_url
            .as_deref()
            .or(self.qr_payload.as_deref())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(body: serde_json::Value) -> PaymentEvent {
        serde_json::from_str(&body.to_string()).unwrap()
    }

    #[test]
    fn keeps_amount_as_received() {
        let event = parse(json!({
            "order_id": "ORD-1",
            "status_code": "200",
            "transaction_status": "settlement",
            "gross_amount": "20000.00",
            "payment_type": "qris",
            "signature_key": "abc"
        }));

        assert_eq!(event.gross_amount, "20000.00");
        assert_eq!(event.gross_amount_units(), Some(20000));
        assert_eq!(event.transaction_status, TransactionStatus::Settlement);
        assert_eq!(event.signature, "abc");
    }

    #[test]
    fn numeric_amount_and_code_are_accepted() {
        let event = parse(json!({
            "order_id": "ORD-1",
            "status_code": 200,
            "transaction_status": "expire",
            "gross_amount": 15000,
            "signature_key": "abc"
        }));

        assert_eq!(event.status_code, "200");
        assert_eq!(event.gross_amount, "15000");
        assert_eq!(event.transaction_status.outcome(), PaymentOutcome::Abandoned);
    }

    #[test]
    fn classifies_statuses() {
        let outcome = |s: &str| TransactionStatus::from(s.to_string()).outcome();
        assert_eq!(outcome("capture"), PaymentOutcome::Paid);
        assert_eq!(outcome("pending"), PaymentOutcome::Pending);
        assert_eq!(outcome("deny"), PaymentOutcome::Abandoned);
        assert_eq!(outcome("cancel"), PaymentOutcome::Abandoned);
        assert_eq!(outcome("refund"), PaymentOutcome::Unhandled);
    }

    #[test]
    fn fractional_amounts_are_not_whole_units() {
        let mut event = parse(json!({
            "order_id": "ORD-1",
            "transaction_status": "settlement",
            "gross_amount": "20000.50"
        }));
        assert_eq!(event.gross_amount_units(), None);

        event.gross_amount = "abc".to_string();
        assert_eq!(event.gross_amount_units(), None);
    }

    #[test]
    fn numeric_tokens_keep_their_literal_text() {
        let body = r#"{"order_id":"ORD-1","status_code":200,"transaction_status":"settlement","gross_amount":10000.00}"#;
        let event: PaymentEvent = serde_json::from_str(body).unwrap();

        assert_eq!(event.gross_amount, "10000.00");
        assert_eq!(event.status_code, "200");
        assert_eq!(event.gross_amount_units(), Some(10000));
    }

    #[test]
    fn escaped_strings_are_unescaped_and_other_types_rejected() {
        let event: PaymentEvent = serde_json::from_str(
            r#"{"order_id":"ORD-1","transaction_status":"settlement","gross_amount":"1\u0030"}"#,
        )
        .unwrap();
        assert_eq!(event.gross_amount, "10");

        let result = serde_json::from_str::<PaymentEvent>(
            r#"{"order_id":"ORD-1","transaction_status":"settlement","gross_amount":true}"#,
        );
        assert!(result.is_err());
    }
}
