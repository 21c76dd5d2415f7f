//! Chat command handling.
//!
//! Parses the text of an inbound chat message into a [`Command`] and builds
//! the reply. Purchases go through the order state machine; everything else
//! reads the catalog.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::AppError;
use crate::models::product::Product;
use crate::services::catalog_service::CatalogCache;
use crate::services::notification_service::format_amount;
use crate::services::order_service::{OrderService, PurchaseReceipt};

/// Maximum number of products listed for one search.
const SEARCH_LIMIT: usize = 6;

/// Products per `#list` page.
const PAGE_SIZE: usize = 8;

/// A recognised chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Menu,
    Ping,
    Categories,
    Search(String),
    /// `category` is empty for the whole catalog; `page` is 1-based
    List { category: String, page: usize },
    Detail(String),
    /// Order through the seller's chat instead of the gateway
    ManualOrder(String),
    /// `quantity` is 0 when the token was numeric but unusable
    BuyNow { code: String, quantity: u32 },
    Refresh,
}

/// Parse `#command args`. Anything else is not a command.
pub fn parse_command(text: &str) -> Option<Command> {
    let text = text.trim();
    let rest = text.strip_prefix('#')?;
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    let command = match name.to_lowercase().as_str() {
        "menu" | "help" => Command::Menu,
        "ping" => Command::Ping,
        "categories" | "kategori" => Command::Categories,
        "search" | "cari" | "harga" => Command::Search(args.to_string()),
        "list" => parse_list(args),
        "detail" => Command::Detail(first_token(args).to_string()),
        "order" | "beli" => Command::ManualOrder(first_token(args).to_string()),
        "buynow" => {
            let mut tokens = args.split_whitespace();
            let code = tokens.next().unwrap_or_default().to_string();
            let quantity = match tokens.next() {
                Some(token) if token.chars().all(|c| c.is_ascii_digit()) => {
                    token.parse().unwrap_or(0)
                }
                _ => 1,
            };
            Command::BuyNow { code, quantity }
        }
        "refresh" => Command::Refresh,
        _ => return None,
    };
    Some(command)
}

fn first_token(args: &str) -> &str {
    args.split_whitespace().next().unwrap_or_default()
}

/// `#list [category] [page]`: a trailing number is the page.
fn parse_list(args: &str) -> Command {
    let mut tokens: Vec<&str> = args.split_whitespace().collect();
    let page = tokens
        .last()
        .filter(|last| last.chars().all(|c| c.is_ascii_digit()))
        .map(|last| last.parse().unwrap_or(usize::MAX));
    if page.is_some() {
        tokens.pop();
    }
    Command::List {
        category: tokens.join(" "),
        page: page.unwrap_or(1),
    }
}

/// One page of `items` with the page actually shown and the page count.
///
/// Out-of-range pages are clamped; an empty list still has one page.
fn paginate<T>(items: &[T], page: usize, per_page: usize) -> (&[T], usize, usize) {
    let total = items.len().div_ceil(per_page).max(1);
    let page = page.clamp(1, total);
    let start = (page - 1) * per_page;
    let end = (start + per_page).min(items.len());
    (&items[start.min(end)..end], page, total)
}

pub struct CommandService {
    catalog: Arc<CatalogCache>,
    orders: Arc<OrderService>,
    admins: HashSet<String>,
    admin_contact: String,
}

impl CommandService {
    pub fn new(
        catalog: Arc<CatalogCache>,
        orders: Arc<OrderService>,
        admins: impl IntoIterator<Item = String>,
        admin_contact: String,
    ) -> Self {
        Self {
            catalog,
            orders,
            admins: admins.into_iter().collect(),
            admin_contact,
        }
    }

    /// Reply to `text` sent by `sender`, or `None` if it is not a command.
    pub async fn handle(&self, sender: &str, text: &str) -> Option<String> {
        let command = parse_command(text)?;
        tracing::debug!(sender, ?command, "chat command");

        let reply = match command {
            Command::Menu => self.menu(sender),
            Command::Ping => "Pong. The bot is online.".to_string(),
            Command::Refresh => self.refresh(sender).await,
            Command::Categories => {
                self.warm_catalog().await;
                let categories = self.catalog.categories();
                if categories.is_empty() {
                    "No categories yet.".to_string()
                } else {
                    let list: Vec<String> = categories.into_iter().collect();
                    format!("Categories\n• {}", list.join("\n• "))
                }
            }
            Command::Search(query) => {
                if query.is_empty() {
                    return Some("Usage: #search <keyword>".to_string());
                }
                self.warm_catalog().await;
                let found = self.catalog.search(&query);
                if found.is_empty() {
                    "Nothing found.".to_string()
                } else {
                    found
                        .iter()
                        .take(SEARCH_LIMIT)
                        .map(product_card)
                        .collect::<Vec<_>>()
                        .join("\n\n")
                }
            }
            Command::List { category, page } => {
                self.warm_catalog().await;
                self.list(&category, page)
            }
            Command::Detail(code) => {
                self.warm_catalog().await;
                match self.catalog.lookup(&code) {
                    Some(product) => product_card(&product),
                    None => "Product code not found.".to_string(),
                }
            }
            Command::ManualOrder(code) => {
                if code.is_empty() {
                    return Some("Usage: #order <code>".to_string());
                }
                self.warm_catalog().await;
                match self.catalog.lookup(&code) {
                    Some(product) => self.manual_order(&product),
                    None => "Product code not found.".to_string(),
                }
            }
            Command::BuyNow { code, quantity } => {
                match self.orders.purchase(sender, &code, quantity).await {
                    Ok(receipt) => purchase_reply(&receipt),
                    Err(e) => {
                        if e.is_infrastructure() {
                            tracing::error!(sender, code = %code, "purchase failed: {:?}", e);
                        }
                        e.buyer_message().to_string()
                    }
                }
            }
        };
        Some(reply)
    }

    async fn warm_catalog(&self) {
        if let Err(e) = self.catalog.refresh(false).await {
            tracing::warn!("catalog refresh failed, using cached products: {:?}", e);
        }
    }

    async fn refresh(&self, sender: &str) -> String {
        if !self.admins.contains(sender) {
            return "Admins only.".to_string();
        }
        match self.catalog.refresh(true).await {
            Ok(count) => format!("Catalog reloaded. Items: {count}"),
            Err(AppError::Upstream(_)) | Err(AppError::Http(_)) => {
                "Catalog source is unreachable; the previous catalog is still in use.".to_string()
            }
            Err(e) => {
                tracing::error!("catalog refresh failed: {:?}", e);
                "Catalog reload failed.".to_string()
            }
        }
    }

    fn list(&self, category: &str, page: usize) -> String {
        let products = self.catalog.in_category(category);
        if products.is_empty() {
            return if category.is_empty() {
                "No products yet.".to_string()
            } else {
                format!("No products in category {category}.")
            };
        }

        let (shown, page, total) = paginate(&products, page, PAGE_SIZE);
        let cards: Vec<String> = shown.iter().map(product_card).collect();
        let mut reply = cards.join("\n\n");
        reply.push_str(&format!("\n\nPage {page}/{total}"));
        if page < total {
            let filter = if category.is_empty() {
                String::new()
            } else {
                format!("{category} ")
            };
            reply.push_str(&format!(". Next page: #list {filter}{}", page + 1));
        }
        reply
    }

    /// Contact link that opens the seller's chat with a prefilled message.
    fn manual_order(&self, product: &Product) -> String {
        let contact = if product.seller_contact.is_empty() {
            &self.admin_contact
        } else {
            &product.seller_contact
        };
        let digits: String = contact.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return "No seller contact is set for this product. Use #buynow instead.".to_string();
        }

        let text = format!(
            "Hello admin, I would like to buy {} (code: {}).",
            product.name, product.code
        );
        let mut link = match url::Url::parse(&format!("https://wa.me/{digits}")) {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!(code = %product.code, "unusable seller contact: {}", e);
                return "No seller contact is set for this product. Use #buynow instead."
                    .to_string();
            }
        };
        link.query_pairs_mut().append_pair("text", &text);

        format!(
            "{}\nPrice: {}\n\nOrder through the seller:\n{}",
            product.name.to_uppercase(),
            display_price(product),
            link
        )
    }

    fn menu(&self, sender: &str) -> String {
        let mut lines = vec![
            "Menu",
            "• #ping",
            "• #categories",
            "• #list [category] [page]",
            "• #search <keyword>",
            "• #detail <code>",
            "• #buynow <code> <quantity>",
            "• #order <code> (through the seller)",
        ];
        if self.admins.contains(sender) {
            lines.push("• #refresh (admin)");
        }
        let mut menu = lines.join("\n");
        if !self.admin_contact.is_empty() {
            menu.push_str(&format!("\n\nContact admin: {}", self.admin_contact));
        }
        menu
    }
}

fn display_price(product: &Product) -> String {
    if !product.has_price() {
        return "-".to_string();
    }
    match product.old_price {
        Some(old) if old > product.unit_price => format!(
            "~{}~ {}",
            format_amount(old),
            format_amount(product.unit_price)
        ),
        _ => format_amount(product.unit_price),
    }
}

/// Sheet total, else available plus sold when both are numbers.
fn total_stock(product: &Product) -> String {
    if !product.total_stock.is_empty() {
        return product.total_stock.clone();
    }
    match (
        product.available.parse::<u64>(),
        product.sold.parse::<u64>(),
    ) {
        (Ok(available), Ok(sold)) => available.saturating_add(sold).to_string(),
        _ => "-".to_string(),
    }
}

fn product_card(product: &Product) -> String {
    let or_dash = |s: &str| if s.is_empty() { "-".to_string() } else { s.to_string() };

    let mut lines = vec![
        product.name.to_uppercase(),
        format!("Price: {}", display_price(product)),
        format!("Stock: {}", or_dash(&product.available)),
        format!("Sold: {}", or_dash(&product.sold)),
        format!("Total stock: {}", total_stock(product)),
        format!("Code: {}", product.code),
        format!("Description: {}", or_dash(&product.description)),
    ];
    if product.icon_url.starts_with("http") {
        lines.push(format!("Image: {}", product.icon_url));
    }
    lines.join("\n")
}

fn purchase_reply(receipt: &PurchaseReceipt) -> String {
    let order = &receipt.order;
    [
        "Order created".to_string(),
        format!("Order ID: {}", order.order_id),
        format!("Product: {} x {}", order.product_name, order.quantity),
        format!("Total: {}", format_amount(order.total_amount)),
        String::new(),
        "Complete your payment here:".to_string(),
        receipt.invoice.checkout_reference().to_string(),
        String::new(),
        "Once the payment succeeds your items are sent to this chat automatically.".to_string(),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_buynow_with_and_without_quantity() {
        assert_eq!(
            parse_command("#buynow spo3b 2"),
            Some(Command::BuyNow {
                code: "spo3b".to_string(),
                quantity: 2
            })
        );
        assert_eq!(
            parse_command("  #BUYNOW spo3b"),
            Some(Command::BuyNow {
                code: "spo3b".to_string(),
                quantity: 1
            })
        );
    }

    #[test]
    fn non_numeric_quantity_defaults_to_one() {
        assert_eq!(
            parse_command("#buynow spo3b two"),
            Some(Command::BuyNow {
                code: "spo3b".to_string(),
                quantity: 1
            })
        );
    }

    #[test]
    fn zero_or_overflowing_quantity_is_zero() {
        for text in ["#buynow spo3b 0", "#buynow spo3b 99999999999999"] {
            assert_eq!(
                parse_command(text),
                Some(Command::BuyNow {
                    code: "spo3b".to_string(),
                    quantity: 0
                })
            );
        }
    }

    #[test]
    fn parses_catalog_commands() {
        assert_eq!(parse_command("#ping"), Some(Command::Ping));
        assert_eq!(parse_command("#menu"), Some(Command::Menu));
        assert_eq!(parse_command("#kategori"), Some(Command::Categories));
        assert_eq!(
            parse_command("#cari  netflix premium "),
            Some(Command::Search("netflix premium".to_string()))
        );
        assert_eq!(
            parse_command("#detail nfx1 extra"),
            Some(Command::Detail("nfx1".to_string()))
        );
        assert_eq!(parse_command("#refresh"), Some(Command::Refresh));
    }

    #[test]
    fn parses_list_category_and_page() {
        let list = |category: &str, page| Command::List {
            category: category.to_string(),
            page,
        };
        assert_eq!(parse_command("#list"), Some(list("", 1)));
        assert_eq!(parse_command("#list 3"), Some(list("", 3)));
        assert_eq!(parse_command("#list streaming"), Some(list("streaming", 1)));
        assert_eq!(
            parse_command("#list akun premium 2"),
            Some(list("akun premium", 2))
        );
    }

    #[test]
    fn parses_manual_order_aliases() {
        assert_eq!(
            parse_command("#beli nfx1"),
            Some(Command::ManualOrder("nfx1".to_string()))
        );
        assert_eq!(
            parse_command("#order NFX1"),
            Some(Command::ManualOrder("NFX1".to_string()))
        );
    }

    #[test]
    fn paginate_clamps_the_page() {
        let items: Vec<u32> = (1..=20).collect();

        let (first, shown, total) = paginate(&items, 1, 8);
        assert_eq!((first.len(), shown, total), (8, 1, 3));

        let (last, shown, _) = paginate(&items, 99, 8);
        assert_eq!(last, &[17, 18, 19, 20]);
        assert_eq!(shown, 3);

        let (zeroth, shown, _) = paginate(&items, 0, 8);
        assert_eq!(zeroth[0], 1);
        assert_eq!(shown, 1);

        let empty: Vec<u32> = Vec::new();
        assert_eq!(paginate(&empty, 2, 8), (&[][..], 1, 1));
    }

    fn product() -> Product {
        Product {
            code: "nfx1".to_string(),
            name: "Netflix".to_string(),
            unit_price: 50_000,
            old_price: None,
            available: "7".to_string(),
            sold: "3".to_string(),
            total_stock: String::new(),
            category: "Video".to_string(),
            description: String::new(),
            icon_url: "https://img.example/nfx.png".to_string(),
            seller_contact: String::new(),
        }
    }

    #[test]
    fn card_derives_total_stock_from_available_and_sold() {
        let mut item = product();
        let card = product_card(&item);
        assert!(card.contains("Total stock: 10"));
        assert!(card.contains("Image: https://img.example/nfx.png"));

        item.total_stock = "25".to_string();
        assert!(product_card(&item).contains("Total stock: 25"));

        item.total_stock.clear();
        item.sold = "many".to_string();
        assert!(product_card(&item).contains("Total stock: -"));

        item.unit_price = 0;
        assert!(product_card(&item).contains("Price: -"));
    }

    #[test]
    fn ignores_plain_text_and_unknown_commands() {
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("#unknown"), None);
        assert_eq!(parse_command(""), None);
    }
}
