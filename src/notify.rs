//! Outbound messages to the chat transport.
//!
//! Delivery is fire-and-forget relative to trip transitions: [`deliver`]
//! logs and counts failures but never reports them to the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

use crate::conversation::action::ActionKind;
use crate::error::AppError;
use crate::models::user::UserId;
use crate::state::AppState;

/// A button the transport renders; tapping it sends `action` back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Choice {
    pub label: String,
    pub action: ActionKind,
}

impl Choice {
    pub fn new(label: impl Into<String>, action: ActionKind) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboundMessage {
    pub recipient: UserId,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Choice>,
}

impl OutboundMessage {
    pub fn text(recipient: UserId, text: impl Into<String>) -> Self {
        Self {
            recipient,
            text: text.into(),
            choices: Vec::new(),
        }
    }

    pub fn with_choices(mut self, choices: Vec<Choice>) -> Self {
        self.choices = choices;
        self
    }

    pub fn push_choice(&mut self, label: impl Into<String>, action: ActionKind) {
        self.choices.push(Choice::new(label, action));
    }
}

/// Transport seam. Implementations must not assume delivery is retried.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: OutboundMessage) -> Result<(), AppError>;
}

/// Publishes onto the broadcast channel streamed by the `/ws` endpoint.
pub struct ChannelNotifier {
    tx: broadcast::Sender<OutboundMessage>,
}

impl ChannelNotifier {
    pub fn new(tx: broadcast::Sender<OutboundMessage>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, message: OutboundMessage) -> Result<(), AppError> {
        self.tx
            .send(message)
            .map(|_| ())
            .map_err(|_| AppError::Internal("no transport subscribed".to_string()))
    }
}

pub async fn deliver(state: &AppState, message: OutboundMessage) {
    let recipient = message.recipient;
    if let Err(err) = state.notifier.notify(message).await {
        state.metrics.notification_failures_total.inc();
        warn!(recipient, error = %err, "notification dropped");
    }
}

pub async fn deliver_all(state: &AppState, messages: Vec<OutboundMessage>) {
    for message in messages {
        deliver(state, message).await;
    }
}
