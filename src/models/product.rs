//! Catalog product model and row mapping.
//!
//! Products are read from a tabular export whose column names are matched
//! case-insensitively, in English or in Indonesian.

use std::collections::HashMap;

use serde::Serialize;

/// One raw catalog row: lower-cased, trimmed column name to trimmed cell value.
pub type CatalogRow = HashMap<String, String>;

/// A catalog entry.
///
/// # Stock Counters
///
/// `available`, `sold` and `total_stock` are display values copied from the
/// sheet. The stock ledger is the only authority on what can be reserved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    /// Unique key, matched case-insensitively after normalization
    pub code: String,

    pub name: String,

    /// Price per unit in whole currency units (no subunits).
    /// 0 when the price cell is blank or unparseable; such products are
    /// listed but cannot be ordered.
    pub unit_price: u64,

    /// Previous price, shown struck through when present
    pub old_price: Option<u64>,

    pub available: String,
    pub sold: String,
    pub total_stock: String,
    pub category: String,
    pub description: String,
    pub icon_url: String,

    /// Chat id or phone number of the seller, used for manual orders
    pub seller_contact: String,
}

/// Accepted column names per field, first match wins.
const CODE: &[&str] = &["code", "kode"];
const NAME: &[&str] = &["name", "nama"];
const PRICE: &[&str] = &["price", "harga"];
const OLD_PRICE: &[&str] = &["old_price", "harga_lama"];
const AVAILABLE: &[&str] = &["stock", "stok"];
const SOLD: &[&str] = &["sold", "terjual"];
const TOTAL: &[&str] = &["total", "total_stock"];
const CATEGORY: &[&str] = &["category", "kategori"];
const DESCRIPTION: &[&str] = &["description", "deskripsi"];
const ICON: &[&str] = &["icon", "ikon", "icon_url"];
const CONTACT: &[&str] = &["contact", "wa", "seller_contact"];

impl Product {
    pub fn has_price(&self) -> bool {
        self.unit_price > 0
    }

    /// Map a raw row to a product.
    ///
    /// Missing optional columns default to empty strings. Rows without a
    /// name or without a code are dropped (`None`).
    pub fn from_row(row: &CatalogRow) -> Option<Self> {
        let row: CatalogRow = row
            .iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
            .collect();

        let code = column(&row, CODE);
        let name = column(&row, NAME);
        if code.is_empty() || name.is_empty() {
            return None;
        }

        let old_price = column(&row, OLD_PRICE);

        Some(Self {
            code,
            name,
            unit_price: parse_price(&column(&row, PRICE)).unwrap_or(0),
            old_price: parse_price(&old_price),
            available: column(&row, AVAILABLE),
            sold: column(&row, SOLD),
            total_stock: column(&row, TOTAL),
            category: column(&row, CATEGORY),
            description: column(&row, DESCRIPTION),
            icon_url: column(&row, ICON),
            seller_contact: column(&row, CONTACT),
        })
    }
}

fn column(row: &CatalogRow, names: &[&str]) -> String {
    names
        .iter()
        .find_map(|name| row.get(*name).filter(|v| !v.is_empty()))
        .cloned()
        .unwrap_or_default()
}

/// Parse a price cell.
///
/// Plain numbers (`"10000"`, `"10000.00"`) are parsed directly; formatted
/// values such as `"Rp 10.000"` fall back to their digits.
pub fn parse_price(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(value) = raw.parse::<f64>() {
        return (value.is_finite() && value >= 0.0).then(|| value.round() as u64);
    }
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}
