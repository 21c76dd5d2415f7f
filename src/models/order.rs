//! Order model and lifecycle states.
//!
//! An order correlates one buyer, one product, a quantity and one gateway
//! transaction. Its price is snapshotted at creation and never recomputed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::product::Product;

/// Lifecycle state of an order.
///
/// ```text
/// Created -> Reserved -> Invoiced -> { Settled | Released }
/// ```
///
/// `Settling` and `Releasing` are short-lived claims held while the stock
/// ledger call for a terminal transition is in flight. They are never
/// persisted; a failed call rolls the claim back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Reserved,
    Invoiced,
    Settling,
    Releasing,
    Settled,
    Released,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Reserved => "reserved",
            OrderStatus::Invoiced => "invoiced",
            OrderStatus::Settling => "settling",
            OrderStatus::Releasing => "releasing",
            OrderStatus::Settled => "settled",
            OrderStatus::Released => "released",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Settled | OrderStatus::Released)
    }

    /// Reserved or invoiced: holds stock and may still settle or release.
    pub fn is_open(&self) -> bool {
        matches!(self, OrderStatus::Reserved | OrderStatus::Invoiced)
    }

    /// A terminal transition is in flight.
    pub fn is_claimed(&self) -> bool {
        matches!(self, OrderStatus::Settling | OrderStatus::Releasing)
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(OrderStatus::Created),
            "reserved" => Ok(OrderStatus::Reserved),
            "invoiced" => Ok(OrderStatus::Invoiced),
            "settling" => Ok(OrderStatus::Settling),
            "releasing" => Ok(OrderStatus::Releasing),
            "settled" => Ok(OrderStatus::Settled),
            "released" => Ok(OrderStatus::Released),
            other => Err(AppError::InvalidRequest(format!(
                "unknown order status: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two terminal outcomes an order can reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalOutcome {
    Settled,
    Released,
}

impl TerminalOutcome {
    pub fn status(&self) -> OrderStatus {
        match self {
            TerminalOutcome::Settled => OrderStatus::Settled,
            TerminalOutcome::Released => OrderStatus::Released,
        }
    }

    /// The claim state that precedes this outcome.
    pub fn claim(&self) -> OrderStatus {
        match self {
            TerminalOutcome::Settled => OrderStatus::Settling,
            TerminalOutcome::Released => OrderStatus::Releasing,
        }
    }
}

/// One purchase attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    /// Globally unique, also the gateway and ledger correlation key
    pub order_id: String,

    /// Opaque chat id of the buyer
    pub buyer_ref: String,

    pub product_code: String,

    /// Product name snapshot for receipts
    pub product_name: String,

    pub quantity: u32,

    /// Unit price snapshot in whole currency units
    pub unit_price: u64,

    /// `unit_price * quantity`, fixed at creation
    pub total_amount: u64,

    pub status: OrderStatus,

    /// When the current settling/releasing claim was taken
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,

    /// Checkout reference handed to the buyer once invoiced
    pub checkout_url: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Build a new order in the `Created` state from a catalog snapshot.
    ///
    /// # Errors
    ///
    /// - `InvalidQuantity`: quantity is zero
    /// - `ProductUnpriced`: the catalog has no usable price for the product
    /// - `InvalidRequest`: the total overflows
    pub fn new(
        order_id: String,
        buyer_ref: &str,
        product: &Product,
        quantity: u32,
    ) -> Result<Self, AppError> {
        if quantity == 0 {
            return Err(AppError::InvalidQuantity);
        }
        if !product.has_price() {
            return Err(AppError::ProductUnpriced);
        }
        let total_amount = product
            .unit_price
            .checked_mul(quantity as u64)
            .ok_or_else(|| AppError::InvalidRequest("order total overflows".to_string()))?;

        let now = Utc::now();
        Ok(Self {
            order_id,
            buyer_ref: buyer_ref.to_string(),
            product_code: product.code.clone(),
            product_name: product.name.clone(),
            quantity,
            unit_price: product.unit_price,
            total_amount,
            status: OrderStatus::Created,
            claimed_at: None,
            checkout_url: None,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Generate an order id of the form `<prefix>-<unix millis>-<8 hex>`.
///
/// The random suffix keeps ids unique for purchases started in the same
/// millisecond.
pub fn generate_order_id(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        prefix,
        Utc::now().timestamp_millis(),
        &suffix[..8]
    )
}

/// Order journal row.
///
/// # Database Table
///
/// Maps to the `orders` table. Amounts are stored as BIGINT, the status as
/// its snake_case name.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderRow {
    pub order_id: String,
    pub buyer_ref: String,
    pub product_code: String,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: i64,
    pub total_amount: i64,
    pub status: String,
    pub checkout_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = AppError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let invalid = |field: &str| AppError::InvalidRequest(format!("negative {field} in journal"));
        Ok(Self {
            order_id: row.order_id,
            buyer_ref: row.buyer_ref,
            product_code: row.product_code,
            product_name: row.product_name,
            quantity: u32::try_from(row.quantity).map_err(|_| invalid("quantity"))?,
            unit_price: u64::try_from(row.unit_price).map_err(|_| invalid("unit_price"))?,
            total_amount: u64::try_from(row.total_amount).map_err(|_| invalid("total_amount"))?,
            status: row.status.parse()?,
            claimed_at: None,
            checkout_url: row.checkout_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
