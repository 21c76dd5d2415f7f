//! Inbound chat messages forwarded by the transport bridge.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::AppError;

/// One chat message.
///
/// ```json
/// { "sender": "6281234567@c.us", "text": "#buynow spo3b 1" }
/// ```
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub sender: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct MessageAck {
    /// True when the text was a command and a reply was sent
    pub handled: bool,
}

/// Run a chat command and send the reply back through the messenger.
///
/// Mounted behind `bridge_auth`; `sender` is taken as given.
pub async fn receive_message(
    State(state): State<AppState>,
    Json(message): Json<InboundMessage>,
) -> Result<Json<MessageAck>, AppError> {
    if message.sender.trim().is_empty() {
        return Err(AppError::InvalidRequest("sender is required".to_string()));
    }

    let Some(reply) = state.commands.handle(&message.sender, &message.text).await else {
        return Ok(Json(MessageAck { handled: false }));
    };

    state.notifier.send(&message.sender, &reply).await;
    Ok(Json(MessageAck { handled: true }))
}
