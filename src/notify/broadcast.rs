use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::courier::ChatId;
use crate::models::order::Order;
use crate::notify::messages;
use crate::notify::{CourierMessage, MessageKind, Notifier, NotifyError};

pub struct BroadcastNotifier {
    tx: broadcast::Sender<CourierMessage>,
    sessions: DashMap<ChatId, usize>,
}

impl BroadcastNotifier {
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _unused_rx) = broadcast::channel(buffer_size.max(1));
        Self {
            tx,
            sessions: DashMap::new(),
        }
    }

    pub fn connect(&self, chat_id: ChatId) -> Session<'_> {
        *self.sessions.entry(chat_id).or_insert(0) += 1;
        Session {
            notifier: self,
            chat_id,
            rx: Some(self.tx.subscribe()),
        }
    }

    pub fn is_connected(&self, chat_id: ChatId) -> bool {
        self.sessions
            .get(&chat_id)
            .is_some_and(|count| *count > 0)
    }

    pub fn subscribers(&self) -> usize {
        self.tx.receiver_count()
    }

    fn disconnect(&self, chat_id: ChatId) {
        let now_empty = match self.sessions.get_mut(&chat_id) {
            Some(mut count) => {
                *count = count.saturating_sub(1);
                *count == 0
            }
            None => false,
        };
        if now_empty {
            self.sessions.remove_if(&chat_id, |_, count| *count == 0);
        }
    }

    fn publish(&self, message: CourierMessage) -> Result<(), NotifyError> {
        if !self.is_connected(message.chat_id) {
            return Err(NotifyError::NoRecipient(message.chat_id));
        }

        let chat_id = message.chat_id;
        let kind = message.kind;
        self.tx
            .send(message)
            .map_err(|err| NotifyError::Channel(format!("broadcast send failed: {err}")))?;

        debug!(chat_id, ?kind, "courier message published");
        Ok(())
    }
}

pub struct Session<'a> {
    notifier: &'a BroadcastNotifier,
    chat_id: ChatId,
    rx: Option<broadcast::Receiver<CourierMessage>>,
}

impl Session<'_> {
    pub fn take_receiver(&mut self) -> Option<broadcast::Receiver<CourierMessage>> {
        self.rx.take()
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.notifier.disconnect(self.chat_id);
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn send_offer(
        &self,
        chat_id: ChatId,
        order: &Order,
        expires_at: DateTime<Utc>,
    ) -> Result<(), NotifyError> {
        self.publish(CourierMessage {
            chat_id,
            kind: MessageKind::Offer,
            order_id: Some(order.id),
            text: messages::offer_text(order, expires_at),
            buttons: messages::offer_buttons(order.id),
        })
    }

    async fn send_confirmation(&self, chat_id: ChatId, text: &str) -> Result<(), NotifyError> {
        self.publish(CourierMessage {
            chat_id,
            kind: MessageKind::Confirmation,
            order_id: None,
            text: text.to_string(),
            buttons: Vec::new(),
        })
    }

    async fn send_delivery_details(&self, chat_id: ChatId, order: &Order) -> Result<(), NotifyError> {
        self.publish(CourierMessage {
            chat_id,
            kind: MessageKind::DeliveryDetails,
            order_id: Some(order.id),
            text: messages::delivery_details_text(order),
            buttons: Vec::new(),
        })
    }
}
