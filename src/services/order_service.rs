//! Order state machine - core settlement logic.
//!
//! This service coordinates the catalog, the stock ledger, the payment
//! gateway and the order ledger:
//!
//! ```text
//! purchase:  lookup -> reserve -> ledger.put (reserved) -> invoice -> invoiced
//! webhook:   verify -> lookup -> claim -> finalize | release -> terminal -> notify
//! ```
//!
//! # Consistency
//!
//! There is no distributed transaction. Stock is never sold twice because
//! the remote ledger deduplicates by order id and this process claims an
//! order before calling `finalize`/`release`, so duplicate or concurrent
//! webhooks for one order produce exactly one remote call and one
//! notification.
//!
//! # Cancellation
//!
//! The claim -> remote call -> commit sequence runs on its own task. A
//! webhook request that is dropped mid-way (gateway disconnect, timeout)
//! does not cancel it. Claims whose task died anyway are rolled back by
//! reconciliation once they are older than `claim_timeout`.
//!
//! # Failure Policy
//!
//! Purchase-flow failures are returned to the buyer. Webhook-flow failures
//! are logged and reported as an outcome; the gateway always gets an
//! acknowledgement so it does not retry-storm.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clients::{PaymentGateway, StockLedger};
use crate::error::AppError;
use crate::models::order::{Order, OrderStatus, TerminalOutcome, generate_order_id};
use crate::models::payment::{Invoice, InvoiceMode, InvoiceRequest, PaymentEvent, PaymentOutcome};
use crate::services::catalog_service::CatalogCache;
use crate::services::notification_service::NotificationService;
use crate::services::order_ledger::{Claim, OrderLedger};

/// Tunables for the state machine.
#[derive(Debug, Clone)]
pub struct OrderSettings {
    pub order_id_prefix: String,
    pub invoice_mode: InvoiceMode,
    /// Open orders older than this are released by reconciliation
    pub reservation_timeout: chrono::Duration,
    /// Terminal orders older than this are dropped from memory
    pub terminal_retention: chrono::Duration,
    /// Settling/releasing claims older than this are rolled back
    pub claim_timeout: chrono::Duration,
}

impl Default for OrderSettings {
    fn default() -> Self {
        Self {
            order_id_prefix: "ORD".to_string(),
            invoice_mode: InvoiceMode::Redirect,
            reservation_timeout: chrono::Duration::hours(1),
            terminal_retention: chrono::Duration::days(1),
            claim_timeout: chrono::Duration::seconds(30),
        }
    }
}

/// A successfully invoiced purchase.
#[derive(Debug, Clone)]
pub struct PurchaseReceipt {
    pub order: Order,
    pub invoice: Invoice,
}

/// What a webhook (or an operator release) did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOutcome {
    Settled,
    Released,
    /// Payment still pending at the gateway
    Pending,
    /// Status this service does not act on
    Ignored,
    /// No such order in the ledger
    UnknownOrder,
    /// Order already settled or released; nothing repeated
    AlreadyTerminal,
    /// Another delivery is settling or releasing this order right now
    InFlight,
    /// Paid amount differs from the order total; left for manual review
    AmountMismatch,
    FinalizeFailed,
    ReleaseFailed,
}

/// Summary of one reconciliation sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    /// Abandoned claims rolled back to their open state
    pub recovered: Vec<String>,
    pub released: Vec<String>,
    pub failed: Vec<String>,
    pub purged: usize,
}

pub struct OrderService {
    catalog: Arc<CatalogCache>,
    stock: Arc<dyn StockLedger>,
    gateway: Arc<dyn PaymentGateway>,
    ledger: Arc<OrderLedger>,
    notifier: Arc<NotificationService>,
    settings: OrderSettings,
}

impl OrderService {
    pub fn new(
        catalog: Arc<CatalogCache>,
        stock: Arc<dyn StockLedger>,
        gateway: Arc<dyn PaymentGateway>,
        ledger: Arc<OrderLedger>,
        notifier: Arc<NotificationService>,
        settings: OrderSettings,
    ) -> Self {
        Self {
            catalog,
            stock,
            gateway,
            ledger,
            notifier,
            settings,
        }
    }

    pub fn ledger(&self) -> &OrderLedger {
        &self.ledger
    }

    /// Handle a purchase command.
    ///
    /// # Process
    ///
    /// 1. Validate quantity and resolve the product code
    /// 2. Reserve stock (no order exists unless this succeeds)
    /// 3. Record the order as reserved with a price snapshot
    /// 4. Open an invoice and record the order as invoiced
    ///
    /// # Errors
    ///
    /// - `InvalidQuantity` / `ProductNotFound`: nothing reserved, no order
    /// - `InsufficientStock` / `StockLedgerUnavailable`: ledger said no, no order
    /// - infrastructure errors from the ledger: no order
    /// - infrastructure errors from the gateway: the order stays reserved
    ///   until reconciliation releases it
    pub async fn purchase(
        &self,
        buyer_ref: &str,
        code: &str,
        quantity: u32,
    ) -> Result<PurchaseReceipt, AppError> {
        if quantity == 0 {
            return Err(AppError::InvalidQuantity);
        }

        // Stale data is acceptable; the ledger has the final say on stock.
        if let Err(e) = self.catalog.refresh(false).await {
            tracing::warn!("catalog refresh failed, using cached products: {:?}", e);
        }
        let product = self.catalog.lookup(code).ok_or(AppError::ProductNotFound)?;

        let mut order = Order::new(
            generate_order_id(&self.settings.order_id_prefix),
            buyer_ref,
            &product,
            quantity,
        )?;

        let reservation = self
            .stock
            .reserve(&order.order_id, &product.code, quantity, buyer_ref)
            .await?;
        if !reservation.ok {
            tracing::info!(
                order_id = %order.order_id,
                code = %product.code,
                quantity,
                msg = reservation.msg.as_deref().unwrap_or_default(),
                "reservation refused"
            );
            return Err(if reservation.unavailable {
                AppError::StockLedgerUnavailable
            } else {
                AppError::InsufficientStock
            });
        }

        order.status = OrderStatus::Reserved;
        order.updated_at = Utc::now();
        self.ledger.put(order.clone()).await;
        tracing::info!(
            order_id = %order.order_id,
            code = %order.product_code,
            quantity,
            total = order.total_amount,
            "stock reserved"
        );

        let request = InvoiceRequest {
            order_id: order.order_id.clone(),
            gross_amount: order.total_amount,
            buyer_contact: phone_digits(buyer_ref),
            product_label: format!("{} x {}", order.product_name, order.quantity),
            expiry_minutes: u64::try_from(self.settings.reservation_timeout.num_minutes())
                .unwrap_or(1)
                .max(1),
        };

        let invoice = match self.open_invoice(&request).await {
            Ok(invoice) => invoice,
            Err(e) => {
                tracing::error!(
                    order_id = %order.order_id,
                    "invoice creation failed, order stays reserved until reconciliation: {:?}",
                    e
                );
                return Err(e);
            }
        };

        let order = self
            .ledger
            .mark_invoiced(&order.order_id, invoice.checkout_reference())
            .await?;
        tracing::info!(order_id = %order.order_id, mode = ?invoice.mode, "invoice created");

        Ok(PurchaseReceipt { order, invoice })
    }

    /// Open an invoice in the configured mode; QR falls back to redirect.
    async fn open_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, AppError> {
        match self.settings.invoice_mode {
            InvoiceMode::Redirect => {
                self.gateway
                    .create_invoice(request, InvoiceMode::Redirect)
                    .await
            }
            InvoiceMode::Qr => match self.gateway.create_invoice(request, InvoiceMode::Qr).await {
                Ok(invoice) => Ok(invoice),
                Err(e) => {
                    tracing::warn!(
                        order_id = %request.order_id,
                        "qr invoice failed, falling back to redirect: {:?}",
                        e
                    );
                    self.gateway
                        .create_invoice(request, InvoiceMode::Redirect)
                        .await
                }
            },
        }
    }

    /// Handle a payment webhook.
    ///
    /// # Errors
    ///
    /// Only `InvalidSignature`, returned before anything is read or changed.
    /// Every other problem is reported through the outcome.
    pub async fn handle_payment_event(
        self: &Arc<Self>,
        event: &PaymentEvent,
    ) -> Result<SettlementOutcome, AppError> {
        if !self.gateway.verify_webhook_signature(event) {
            tracing::warn!(
                order_id = %event.order_id,
                status = event.transaction_status.as_str(),
                "rejected payment webhook with invalid signature"
            );
            return Err(AppError::InvalidSignature);
        }

        let outcome = match event.transaction_status.outcome() {
            PaymentOutcome::Paid => {
                let this = Arc::clone(self);
                let paid = event.clone();
                detached(&event.order_id, async move { this.settle(&paid).await }).await
            }
            PaymentOutcome::Abandoned => {
                self.release_order(&event.order_id, event.transaction_status.as_str())
                    .await
            }
            PaymentOutcome::Pending => SettlementOutcome::Pending,
            PaymentOutcome::Unhandled => SettlementOutcome::Ignored,
        };

        tracing::info!(
            order_id = %event.order_id,
            status = event.transaction_status.as_str(),
            payment_type = %event.payment_type,
            outcome = ?outcome,
            "payment webhook handled"
        );
        Ok(outcome)
    }

    async fn settle(&self, event: &PaymentEvent) -> SettlementOutcome {
        let order_id = event.order_id.as_str();

        let Some(order) = self.ledger.get(order_id) else {
            return SettlementOutcome::UnknownOrder;
        };
        if order.status == OrderStatus::Released {
            tracing::warn!(order_id, "payment received for a released order, needs manual reconciliation");
            return SettlementOutcome::AlreadyTerminal;
        }
        if order.status.is_terminal() {
            return SettlementOutcome::AlreadyTerminal;
        }
        if event.gross_amount_units() != Some(order.total_amount) {
            tracing::warn!(
                order_id,
                paid = %event.gross_amount,
                expected = order.total_amount,
                "paid amount does not match order total, not finalizing"
            );
            return SettlementOutcome::AmountMismatch;
        }

        let prior = match self.ledger.claim(order_id, TerminalOutcome::Settled) {
            Claim::Claimed(prior) => prior,
            Claim::NotFound => return SettlementOutcome::UnknownOrder,
            Claim::Terminal(_) => return SettlementOutcome::AlreadyTerminal,
            Claim::Busy(_) => return SettlementOutcome::InFlight,
        };

        let finalized = match self.stock.finalize(order_id, prior.total_amount).await {
            Ok(result) if result.ok => result,
            Ok(result) => {
                tracing::error!(
                    order_id,
                    msg = result.msg.as_deref().unwrap_or_default(),
                    "stock finalize refused, order left for reconciliation"
                );
                self.ledger.rollback(order_id, prior.status);
                return SettlementOutcome::FinalizeFailed;
            }
            Err(e) => {
                tracing::error!(order_id, "stock finalize failed: {:?}", e);
                self.ledger.rollback(order_id, prior.status);
                return SettlementOutcome::FinalizeFailed;
            }
        };

        match self.ledger.mark_terminal(order_id, TerminalOutcome::Settled).await {
            Ok(Some(order)) => {
                tracing::info!(order_id, items = finalized.items.len(), "order settled");
                self.notifier.notify_settled(&order, &finalized.items).await;
                SettlementOutcome::Settled
            }
            Ok(None) => SettlementOutcome::AlreadyTerminal,
            Err(e) => {
                tracing::error!(order_id, "could not mark order settled: {:?}", e);
                SettlementOutcome::AlreadyTerminal
            }
        }
    }

    /// Release an open order and tell the buyer.
    ///
    /// Shared by abandonment webhooks, reconciliation (`reason = "timeout"`)
    /// and the operator endpoint. Runs detached from the caller.
    pub async fn release_order(self: &Arc<Self>, order_id: &str, reason: &str) -> SettlementOutcome {
        let this = Arc::clone(self);
        let (id, why) = (order_id.to_string(), reason.to_string());
        detached(order_id, async move { this.release(&id, &why).await }).await
    }

    async fn release(&self, order_id: &str, reason: &str) -> SettlementOutcome {
        let prior = match self.ledger.claim(order_id, TerminalOutcome::Released) {
            Claim::Claimed(prior) => prior,
            Claim::NotFound => return SettlementOutcome::UnknownOrder,
            Claim::Terminal(_) => return SettlementOutcome::AlreadyTerminal,
            Claim::Busy(_) => return SettlementOutcome::InFlight,
        };

        match self.stock.release(order_id).await {
            Ok(result) if result.ok => {}
            Ok(result) => {
                tracing::error!(
                    order_id,
                    msg = result.msg.as_deref().unwrap_or_default(),
                    "stock release refused, order left for reconciliation"
                );
                self.ledger.rollback(order_id, prior.status);
                return SettlementOutcome::ReleaseFailed;
            }
            Err(e) => {
                tracing::error!(order_id, "stock release failed: {:?}", e);
                self.ledger.rollback(order_id, prior.status);
                return SettlementOutcome::ReleaseFailed;
            }
        }

        match self.ledger.mark_terminal(order_id, TerminalOutcome::Released).await {
            Ok(Some(order)) => {
                tracing::info!(order_id, reason, "order released");
                self.notifier.notify_released(&order, reason).await;
                SettlementOutcome::Released
            }
            Ok(None) => SettlementOutcome::AlreadyTerminal,
            Err(e) => {
                tracing::error!(order_id, "could not mark order released: {:?}", e);
                SettlementOutcome::AlreadyTerminal
            }
        }
    }

    /// Roll back abandoned claims, release open orders past the reservation
    /// timeout and drop old terminal orders from memory.
    pub async fn reconcile(self: &Arc<Self>, now: DateTime<Utc>) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        report.recovered = self
            .ledger
            .recover_stale_claims(now - self.settings.claim_timeout);
        for order_id in &report.recovered {
            tracing::warn!(order_id = %order_id, "abandoned claim rolled back");
        }

        let cutoff = now - self.settings.reservation_timeout;
        for order in self.ledger.stale_open(cutoff) {
            match self.release_order(&order.order_id, "timeout").await {
                SettlementOutcome::Released => report.released.push(order.order_id),
                SettlementOutcome::ReleaseFailed => report.failed.push(order.order_id),
                _ => {}
            }
        }

        report.purged = self
            .ledger
            .purge_terminal(now - self.settings.terminal_retention);

        if !report.recovered.is_empty()
            || !report.released.is_empty()
            || !report.failed.is_empty()
            || report.purged > 0
        {
            tracing::info!(
                recovered = report.recovered.len(),
                released = report.released.len(),
                failed = report.failed.len(),
                purged = report.purged,
                "reconciliation sweep finished"
            );
        }
        report
    }

    /// Run `reconcile` every `every` until the runtime shuts down.
    pub fn spawn_reconciler(self: Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.reconcile(Utc::now()).await;
            }
        })
    }
}

/// Run a terminal transition on its own task so dropping the caller cannot
/// strand a claim between the remote call and the commit.
async fn detached<F>(order_id: &str, transition: F) -> SettlementOutcome
where
    F: Future<Output = SettlementOutcome> + Send + 'static,
{
    match tokio::spawn(transition).await {
        Ok(outcome) => outcome,
        Err(e) => {
            // The claim, if taken, is recovered by reconciliation.
            tracing::error!(order_id, "settlement task did not finish: {:?}", e);
            SettlementOutcome::InFlight
        }
    }
}

/// Digits of a chat id, e.g. `6281234@c.us` -> `6281234`.
fn phone_digits(buyer_ref: &str) -> String {
    buyer_ref.chars().filter(char::is_ascii_digit).collect()
}
