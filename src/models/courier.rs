use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ChatId = i64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Courier {
    pub id: Uuid,
    pub chat_id: ChatId,
    pub name: String,
    pub phone: String,
    pub is_active: bool,
    pub current_order: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}
