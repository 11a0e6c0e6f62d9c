pub mod broadcast;
pub mod messages;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::courier::ChatId;
use crate::models::order::Order;

pub use broadcast::BroadcastNotifier;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("no connected device for chat {0}")]
    NoRecipient(ChatId),

    #[error("channel failure: {0}")]
    Channel(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Offer,
    Confirmation,
    DeliveryDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Button {
    pub text: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourierMessage {
    pub chat_id: ChatId,
    pub kind: MessageKind,
    pub order_id: Option<Uuid>,
    pub text: String,
    pub buttons: Vec<Button>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_offer(
        &self,
        chat_id: ChatId,
        order: &Order,
        expires_at: DateTime<Utc>,
    ) -> Result<(), NotifyError>;

    async fn send_confirmation(&self, chat_id: ChatId, text: &str) -> Result<(), NotifyError>;

    async fn send_delivery_details(&self, chat_id: ChatId, order: &Order) -> Result<(), NotifyError>;
}
