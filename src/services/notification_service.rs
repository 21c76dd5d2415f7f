//! Notification dispatcher.
//!
//! Turns a terminal order outcome into outbound chat messages. Messages are
//! sent one at a time in order (summary first); a failed send is logged and
//! the remaining messages still go out.

use std::sync::Arc;

use crate::clients::Messenger;
use crate::models::order::Order;
use crate::models::stock::FulfillmentItem;

pub struct NotificationService {
    messenger: Arc<dyn Messenger>,
    max_message_len: Option<usize>,
}

impl NotificationService {
    /// `max_message_len` enables chunking of delivered items.
    pub fn new(messenger: Arc<dyn Messenger>, max_message_len: Option<usize>) -> Self {
        Self {
            messenger,
            max_message_len,
        }
    }

    /// Send one message. Returns whether the transport accepted it.
    pub async fn send(&self, recipient: &str, text: &str) -> bool {
        match self.messenger.send_text(recipient, text).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(recipient, "message delivery failed: {:?}", e);
                false
            }
        }
    }

    /// Confirmation plus delivered items. Returns the number of messages sent.
    pub async fn notify_settled(&self, order: &Order, items: &[FulfillmentItem]) -> usize {
        let messages = settled_messages(order, items, self.max_message_len);
        self.dispatch(order, messages).await
    }

    /// Cancellation notice. `reason` is the gateway status, `timeout` or `manual`.
    pub async fn notify_released(&self, order: &Order, reason: &str) -> usize {
        self.dispatch(order, vec![released_message(order, reason)])
            .await
    }

    async fn dispatch(&self, order: &Order, messages: Vec<String>) -> usize {
        let total = messages.len();
        let mut sent = 0;
        for message in &messages {
            if self.send(&order.buyer_ref, message).await {
                sent += 1;
            }
        }
        tracing::info!(order_id = %order.order_id, sent, total, "notification dispatched");
        sent
    }
}

/// Format whole currency units as `Rp 20.000`.
pub fn format_amount(amount: u64) -> String {
    let digits = amount.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    format!("Rp {grouped}")
}

fn settled_messages(order: &Order, items: &[FulfillmentItem], max_len: Option<usize>) -> Vec<String> {
    let mut summary = vec![
        "Payment received".to_string(),
        format!("Order ID: {}", order.order_id),
        format!(
            "Product: {} ({}) x {}",
            order.product_name, order.product_code, order.quantity
        ),
        format!("Total: {}", format_amount(order.total_amount)),
        String::new(),
    ];
    if items.is_empty() {
        summary.push("Note: your items will be delivered manually by the admin.".to_string());
    } else {
        summary.push("Your items:".to_string());
    }

    let mut messages = vec![summary.join("\n")];
    let lines = items.iter().map(|item| format!("• {}", item.data));

    match max_len {
        None => messages.extend(lines),
        Some(limit) => messages.extend(chunk_lines(lines, limit)),
    }
    messages
}

/// Pack lines into messages of at most `limit` characters.
///
/// A line is never split; a line longer than `limit` is sent on its own.
fn chunk_lines(lines: impl Iterator<Item = String>, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in lines {
        let needed = if current.is_empty() {
            line.chars().count()
        } else {
            current.chars().count() + 1 + line.chars().count()
        };
        if !current.is_empty() && needed > limit {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(&line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn released_message(order: &Order, reason: &str) -> String {
    let headline = match reason {
        "timeout" => "Payment window expired".to_string(),
        "manual" => "Order cancelled by the admin".to_string(),
        status => format!("Payment {status}"),
    };
    format!(
        "{headline}\nOrder ID: {}\nThe order was cancelled and the reserved stock returned.",
        order.order_id
    )
}
