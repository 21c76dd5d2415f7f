//! Outbound side of the chat transport.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::AppError;

/// Send a text message to a chat recipient.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<(), AppError>;
}

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    to: &'a str,
    text: &'a str,
}

/// Posts `{ "to", "text" }` to the transport bridge.
#[derive(Debug, Clone)]
pub struct HttpRelayMessenger {
    client: reqwest::Client,
    url: String,
}

impl HttpRelayMessenger {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl Messenger for HttpRelayMessenger {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<(), AppError> {
        let response = self
            .client
            .post(&self.url)
            .json(&RelayMessage {
                to: recipient,
                text,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Upstream(format!("messenger relay returned {status}")));
        }
        Ok(())
    }
}

/// Logs outbound messages instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct LogMessenger;

#[async_trait]
impl Messenger for LogMessenger {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<(), AppError> {
        tracing::info!(recipient, text, "outbound message (no relay configured)");
        Ok(())
    }
}
