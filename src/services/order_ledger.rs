//! Order ledger - in-flight orders keyed by order id.
//!
//! The ledger is the only owner of `Order` values; everyone else holds the
//! order id. Entries live in a `DashMap`, so every mutation of one order
//! runs under that entry's shard lock and two orders never contend.
//!
//! # Terminal Transitions
//!
//! Settling or releasing is a two-step compare-and-set:
//!
//! 1. `claim` moves an open order to `Settling`/`Releasing` and returns the
//!    prior snapshot; a concurrent caller sees the claim and backs off
//! 2. after the remote call, `mark_terminal` commits or `rollback` restores
//!
//! No lock is held across the remote call. A claim whose owner never came
//! back is handed back by `recover_stale_claims` once it is older than the
//! claim timeout.
//!
//! # Journal
//!
//! With a database pool every durable state (reserved, invoiced, settled,
//! released) is written through to the `orders` table. Journal failures are
//! logged; the in-memory transition stands.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::order::{Order, OrderRow, OrderStatus, TerminalOutcome};

/// Result of trying to claim an order for a terminal transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    /// Claim taken. Carries the order as it was before the claim.
    Claimed(Order),
    NotFound,
    /// Already settled or released.
    Terminal(OrderStatus),
    /// Another terminal transition holds the claim.
    Busy(OrderStatus),
}

pub struct OrderLedger {
    orders: DashMap<String, Order>,
    journal: Option<DbPool>,
}

impl OrderLedger {
    pub fn new(journal: Option<DbPool>) -> Self {
        Self {
            orders: DashMap::new(),
            journal,
        }
    }

    /// In-memory ledger without a journal.
    pub fn in_memory() -> Self {
        Self::new(None)
    }

    /// Insert a freshly reserved order.
    pub async fn put(&self, order: Order) {
        self.orders.insert(order.order_id.clone(), order.clone());
        self.persist(&order).await;
    }

    pub fn get(&self, order_id: &str) -> Option<Order> {
        self.orders.get(order_id).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Record the opened invoice.
    ///
    /// Only a `Reserved` order moves to `Invoiced`; if a webhook got there
    /// first the order is returned unchanged.
    pub async fn mark_invoiced(&self, order_id: &str, checkout_url: &str) -> Result<Order, AppError> {
        let (order, changed) = {
            let mut entry = self
                .orders
                .get_mut(order_id)
                .ok_or(AppError::OrderNotFound)?;
            let changed = entry.status == OrderStatus::Reserved;
            if changed {
                entry.status = OrderStatus::Invoiced;
                entry.checkout_url = Some(checkout_url.to_string());
                entry.updated_at = Utc::now();
            }
            (entry.clone(), changed)
        };

        if changed {
            self.persist(&order).await;
        }
        Ok(order)
    }

    /// Claim an open order for `outcome`.
    pub fn claim(&self, order_id: &str, outcome: TerminalOutcome) -> Claim {
        let Some(mut entry) = self.orders.get_mut(order_id) else {
            return Claim::NotFound;
        };

        let status = entry.status;
        if status.is_terminal() {
            return Claim::Terminal(status);
        }
        if !status.is_open() {
            return Claim::Busy(status);
        }

        let prior = entry.clone();
        let now = Utc::now();
        entry.status = outcome.claim();
        entry.claimed_at = Some(now);
        entry.updated_at = now;
        Claim::Claimed(prior)
    }

    /// Give a claim back after a failed remote call.
    pub fn rollback(&self, order_id: &str, prior: OrderStatus) {
        if let Some(mut entry) = self.orders.get_mut(order_id) {
            if entry.status.is_claimed() {
                entry.status = prior;
                entry.claimed_at = None;
                entry.updated_at = Utc::now();
            }
        }
    }

    /// Roll back claims taken before `cutoff`.
    ///
    /// The prior state is inferred from the checkout reference: an order that
    /// was invoiced goes back to `Invoiced`, anything else to `Reserved`.
    /// Returns the ids handed back, oldest claim first.
    pub fn recover_stale_claims(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        let mut recovered: Vec<(DateTime<Utc>, String)> = Vec::new();
        for mut entry in self.orders.iter_mut() {
            let Some(claimed_at) = entry.claimed_at else {
                continue;
            };
            if !entry.status.is_claimed() || claimed_at >= cutoff {
                continue;
            }
            entry.status = if entry.checkout_url.is_some() {
                OrderStatus::Invoiced
            } else {
                OrderStatus::Reserved
            };
            entry.claimed_at = None;
            entry.updated_at = Utc::now();
            recovered.push((claimed_at, entry.order_id.clone()));
        }
        recovered.sort();
        recovered.into_iter().map(|(_, id)| id).collect()
    }

    /// Move an order to its terminal state.
    ///
    /// Returns `Some(order)` when this call made the transition and `None`
    /// when the order was already in that terminal state (idempotent no-op).
    ///
    /// # Errors
    ///
    /// - `OrderNotFound`: no such order
    /// - `InvalidTransition`: the order reached, or is claimed for, the other
    ///   terminal state
    pub async fn mark_terminal(
        &self,
        order_id: &str,
        outcome: TerminalOutcome,
    ) -> Result<Option<Order>, AppError> {
        let order = {
            let mut entry = self
                .orders
                .get_mut(order_id)
                .ok_or(AppError::OrderNotFound)?;

            let target = outcome.status();
            let status = entry.status;
            if status == target {
                return Ok(None);
            }
            if status.is_terminal() || (status.is_claimed() && status != outcome.claim()) {
                return Err(AppError::InvalidTransition(format!(
                    "order {order_id} is {status}, cannot become {target}"
                )));
            }

            entry.status = target;
            entry.claimed_at = None;
            entry.updated_at = Utc::now();
            entry.clone()
        };

        self.persist(&order).await;
        Ok(Some(order))
    }

    /// Open orders created before `cutoff`.
    pub fn stale_open(&self, cutoff: DateTime<Utc>) -> Vec<Order> {
        let mut stale: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| entry.status.is_open() && entry.created_at < cutoff)
            .map(|entry| entry.clone())
            .collect();
        stale.sort_by_key(|o| o.created_at);
        stale
    }

    /// Drop terminal orders last touched before `cutoff` from memory.
    pub fn purge_terminal(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.orders.len();
        self.orders
            .retain(|_, order| !(order.status.is_terminal() && order.updated_at < cutoff));
        before - self.orders.len()
    }

    /// Load every non-terminal order from the journal.
    pub async fn restore(&self) -> Result<usize, AppError> {
        let Some(pool) = &self.journal else {
            return Ok(0);
        };

        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE status IN ('reserved', 'invoiced')",
        )
        .fetch_all(pool)
        .await?;

        let mut restored = 0;
        for row in rows {
            let order = Order::try_from(row)?;
            self.orders.insert(order.order_id.clone(), order);
            restored += 1;
        }
        Ok(restored)
    }

    async fn persist(&self, order: &Order) {
        let Some(pool) = &self.journal else {
            return;
        };

        // Claims are transient and a terminal row is never overwritten.
        let result = sqlx::query(
            r#"
            INSERT INTO orders (
                order_id,
                buyer_ref,
                product_code,
                product_name,
                quantity,
                unit_price,
                total_amount,
                status,
                checkout_url,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (order_id) DO UPDATE
            SET status = EXCLUDED.status,
                checkout_url = COALESCE(EXCLUDED.checkout_url, orders.checkout_url),
                updated_at = EXCLUDED.updated_at
            WHERE orders.status NOT IN ('settled', 'released')
            "#,
        )
        .bind(&order.order_id)
        .bind(&order.buyer_ref)
        .bind(&order.product_code)
        .bind(&order.product_name)
        .bind(order.quantity as i32)
        .bind(order.unit_price as i64)
        .bind(order.total_amount as i64)
        .bind(order.status.as_str())
        .bind(&order.checkout_url)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(pool)
        .await;

        if let Err(e) = result {
            tracing::error!(order_id = %order.order_id, status = %order.status, "order journal write failed: {:?}", e);
        }
    }
}
