//! Stock ledger wire types.

use serde::{Deserialize, Serialize};

/// A single remote ledger operation.
///
/// Serialized with an `action` tag next to the shared secret:
///
/// ```json
/// { "secret": "...", "action": "reserve", "kode": "spo3b", "qty": 1,
///   "order_id": "ORD-...", "buyer_jid": "62812...@c.us" }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum StockAction<'a> {
    Reserve {
        kode: &'a str,
        qty: u32,
        order_id: &'a str,
        buyer_jid: &'a str,
    },
    Finalize {
        order_id: &'a str,
        total: u64,
    },
    Release {
        order_id: &'a str,
    },
}

impl StockAction<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            StockAction::Reserve { .. } => "reserve",
            StockAction::Finalize { .. } => "finalize",
            StockAction::Release { .. } => "release",
        }
    }
}

/// Request envelope sent to the ledger.
#[derive(Debug, Serialize)]
pub struct StockRequest<'a> {
    pub secret: &'a str,
    #[serde(flatten)]
    pub action: StockAction<'a>,
}

/// One delivered unit, e.g. account credentials or a voucher code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentItem {
    pub data: String,
}

/// Ledger answer: `{ok, items?, msg?}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StockOperationResult {
    pub ok: bool,

    /// Fulfillment records, returned by `finalize`
    #[serde(default)]
    pub items: Vec<FulfillmentItem>,

    #[serde(default)]
    pub msg: Option<String>,

    /// Set locally when no ledger endpoint is configured.
    #[serde(skip)]
    pub unavailable: bool,
}

impl StockOperationResult {
    /// Structured failure returned without contacting the ledger.
    pub fn unavailable(msg: &str) -> Self {
        Self {
            ok: false,
            items: Vec::new(),
            msg: Some(msg.to_string()),
            unavailable: true,
        }
    }

    pub fn success(items: Vec<FulfillmentItem>) -> Self {
        Self {
            ok: true,
            items,
            msg: None,
            unavailable: false,
        }
    }

    pub fn rejected(msg: &str) -> Self {
        Self {
            ok: false,
            items: Vec::new(),
            msg: Some(msg.to_string()),
            unavailable: false,
        }
    }
}
