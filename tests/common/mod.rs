//! Shared in-memory doubles and a wired-up harness for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use chat_order_settlement::AppState;
use chat_order_settlement::clients::payment_gateway::{verify_signature, webhook_signature};
use chat_order_settlement::clients::{CatalogSource, Messenger, PaymentGateway, StockLedger};
use chat_order_settlement::error::AppError;
use chat_order_settlement::middleware::auth::hash_api_key;
use chat_order_settlement::models::payment::{Invoice, InvoiceMode, InvoiceRequest, PaymentEvent};
use chat_order_settlement::models::product::CatalogRow;
use chat_order_settlement::models::stock::{FulfillmentItem, StockOperationResult};
use chat_order_settlement::services::catalog_service::CatalogCache;
use chat_order_settlement::services::command_service::CommandService;
use chat_order_settlement::services::notification_service::NotificationService;
use chat_order_settlement::services::order_ledger::OrderLedger;
use chat_order_settlement::services::order_service::{OrderService, OrderSettings};

pub const SERVER_KEY: &str = "SB-Mid-server-test";
pub const ADMIN_KEY: &str = "admin-secret";
pub const BRIDGE_KEY: &str = "bridge-secret";
pub const ADMIN_CHAT: &str = "6280000000@c.us";
pub const BUYER: &str = "6281234567@c.us";

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Catalog source whose rows can be swapped between fetches.
#[derive(Default)]
pub struct SheetSource {
    pub rows: Mutex<Vec<CatalogRow>>,
    pub fetches: AtomicUsize,
}

impl SheetSource {
    pub fn with_rows(rows: Vec<CatalogRow>) -> Self {
        Self {
            rows: Mutex::new(rows),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn set_rows(&self, rows: Vec<CatalogRow>) {
        *self.rows.lock().unwrap() = rows;
    }
}

#[async_trait]
impl CatalogSource for SheetSource {
    async fn fetch_rows(&self) -> Result<Vec<CatalogRow>, AppError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.lock().unwrap().clone())
    }
}

pub fn row(code: &str, name: &str, price: &str, category: &str) -> CatalogRow {
    [
        ("kode", code),
        ("nama", name),
        ("harga", price),
        ("kategori", category),
        ("stok", "10"),
        ("deskripsi", "Private account, 30 days"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

pub fn default_rows() -> Vec<CatalogRow> {
    vec![
        row("CODE1", "Netflix Premium", "10000", "Streaming"),
        row("CODE2", "Spotify Family", "25000", "Music"),
    ]
}

// ---------------------------------------------------------------------------
// Stock ledger
// ---------------------------------------------------------------------------

/// Stock ledger that deduplicates by order id, like the real one.
pub struct FakeStockLedger {
    stock: Mutex<HashMap<String, u32>>,
    holds: Mutex<HashMap<String, (String, u32)>>,
    pub reserves: AtomicUsize,
    pub finalizes: AtomicUsize,
    pub releases: AtomicUsize,
    pub finalized_totals: Mutex<Vec<u64>>,
    pub fail_finalize: AtomicBool,
    pub fail_release: AtomicBool,
    pub unavailable: AtomicBool,
    /// Simulated round-trip, widens race windows in concurrency tests
    pub latency: Duration,
}

impl FakeStockLedger {
    pub fn new(stock: &[(&str, u32)]) -> Self {
        Self {
            stock: Mutex::new(
                stock
                    .iter()
                    .map(|(code, qty)| (code.to_string(), *qty))
                    .collect(),
            ),
            holds: Mutex::new(HashMap::new()),
            reserves: AtomicUsize::new(0),
            finalizes: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            finalized_totals: Mutex::new(Vec::new()),
            fail_finalize: AtomicBool::new(false),
            fail_release: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn available(&self, code: &str) -> u32 {
        self.stock.lock().unwrap().get(code).copied().unwrap_or(0)
    }

    pub fn is_held(&self, order_id: &str) -> bool {
        self.holds.lock().unwrap().contains_key(order_id)
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl StockLedger for FakeStockLedger {
    async fn reserve(
        &self,
        order_id: &str,
        code: &str,
        qty: u32,
        _buyer_ref: &str,
    ) -> Result<StockOperationResult, AppError> {
        self.reserves.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Ok(StockOperationResult::unavailable("ledger not configured"));
        }
        self.pause().await;

        let mut stock = self.stock.lock().unwrap();
        let available = stock.entry(code.to_string()).or_insert(0);
        if *available < qty {
            return Ok(StockOperationResult::rejected("stock not enough"));
        }
        *available -= qty;
        self.holds
            .lock()
            .unwrap()
            .insert(order_id.to_string(), (code.to_string(), qty));
        Ok(StockOperationResult::success(Vec::new()))
    }

    async fn finalize(&self, order_id: &str, total: u64) -> Result<StockOperationResult, AppError> {
        self.finalizes.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail_finalize.load(Ordering::SeqCst) {
            return Err(AppError::Upstream("ledger timed out".to_string()));
        }

        let Some((code, qty)) = self.holds.lock().unwrap().remove(order_id) else {
            return Ok(StockOperationResult::rejected("no hold for order"));
        };
        self.finalized_totals.lock().unwrap().push(total);
        let items = (1..=qty)
            .map(|n| FulfillmentItem {
                data: format!("{code}-account-{n}"),
            })
            .collect();
        Ok(StockOperationResult::success(items))
    }

    async fn release(&self, order_id: &str) -> Result<StockOperationResult, AppError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail_release.load(Ordering::SeqCst) {
            return Ok(StockOperationResult::rejected("ledger busy"));
        }

        if let Some((code, qty)) = self.holds.lock().unwrap().remove(order_id) {
            *self.stock.lock().unwrap().entry(code).or_insert(0) += qty;
        }
        Ok(StockOperationResult::success(Vec::new()))
    }
}

// ---------------------------------------------------------------------------
// Payment gateway
// ---------------------------------------------------------------------------

/// Gateway that hands out fake checkout links and checks real signatures.
#[derive(Default)]
pub struct FakeGateway {
    pub requests: Mutex<Vec<(InvoiceMode, InvoiceRequest)>>,
    pub fail_qr: AtomicBool,
    pub fail_all: AtomicBool,
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_invoice(
        &self,
        request: &InvoiceRequest,
        mode: InvoiceMode,
    ) -> Result<Invoice, AppError> {
        self.requests.lock().unwrap().push((mode, request.clone()));
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(AppError::Upstream("gateway returned 500".to_string()));
        }
        match mode {
            InvoiceMode::Qr if self.fail_qr.load(Ordering::SeqCst) => {
                Err(AppError::Upstream("qris not enabled".to_string()))
            }
            InvoiceMode::Qr => Ok(Invoice {
                mode,
                token: None,
                checkout_url: None,
                qr_payload: Some(format!("00020101QR{}", request.order_id)),
            }),
            InvoiceMode::Redirect => Ok(Invoice {
                mode,
                token: Some(format!("tok-{}", request.order_id)),
                checkout_url: Some(format!("https://pay.test/{}", request.order_id)),
                qr_payload: None,
            }),
        }
    }

    fn verify_webhook_signature(&self, event: &PaymentEvent) -> bool {
        verify_signature(event, SERVER_KEY)
    }
}

impl FakeGateway {
    pub fn modes(&self) -> Vec<InvoiceMode> {
        self.requests.lock().unwrap().iter().map(|(m, _)| *m).collect()
    }
}

// ---------------------------------------------------------------------------
// Messenger
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingMessenger {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingMessenger {
    pub fn messages_to(&self, recipient: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| to == recipient)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<(), AppError> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), text.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub source: Arc<SheetSource>,
    pub stock: Arc<FakeStockLedger>,
    pub gateway: Arc<FakeGateway>,
    pub messenger: Arc<RecordingMessenger>,
    pub orders: Arc<OrderService>,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(
            FakeStockLedger::new(&[("CODE1", 10), ("CODE2", 5)]),
            OrderSettings::default(),
        )
    }

    pub fn build(stock: FakeStockLedger, settings: OrderSettings) -> Self {
        let source = Arc::new(SheetSource::with_rows(default_rows()));
        let stock = Arc::new(stock);
        let gateway = Arc::new(FakeGateway::default());
        let messenger = Arc::new(RecordingMessenger::default());

        // Zero TTL: every lookup sees the latest rows.
        let catalog = Arc::new(CatalogCache::new(source.clone(), Duration::ZERO));
        let notifier = Arc::new(NotificationService::new(messenger.clone(), None));
        let orders = Arc::new(OrderService::new(
            catalog.clone(),
            stock.clone(),
            gateway.clone(),
            Arc::new(OrderLedger::in_memory()),
            notifier.clone(),
            settings,
        ));
        let commands = Arc::new(CommandService::new(
            catalog.clone(),
            orders.clone(),
            [ADMIN_CHAT.to_string()],
            "wa.me/6280000000".to_string(),
        ));

        let state = AppState {
            catalog,
            orders: orders.clone(),
            commands,
            notifier,
            admin_key_hash: Some(hash_api_key(ADMIN_KEY)),
            bridge_key_hash: Some(hash_api_key(BRIDGE_KEY)),
        };

        Self {
            source,
            stock,
            gateway,
            messenger,
            orders,
            state,
        }
    }
}

/// A correctly signed webhook body.
pub fn signed_payload(order_id: &str, status: &str, gross_amount: &str) -> Value {
    let status_code = if status == "pending" { "201" } else { "200" };
    json!({
        "order_id": order_id,
        "status_code": status_code,
        "transaction_status": status,
        "gross_amount": gross_amount,
        "payment_type": "qris",
        "signature_key": webhook_signature(order_id, status_code, gross_amount, SERVER_KEY),
    })
}

/// Parsed from text, the way the webhook handler parses a body.
pub fn signed_event(order_id: &str, status: &str, gross_amount: &str) -> PaymentEvent {
    serde_json::from_str(&signed_payload(order_id, status, gross_amount).to_string()).unwrap()
}
