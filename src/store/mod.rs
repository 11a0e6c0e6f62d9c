pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::assignment::{Assignment, AssignmentStatus};
use crate::models::courier::{ChatId, Courier};
use crate::models::order::Order;

pub use memory::MemoryStore;

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: Order) -> Result<Order, AppError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Order>, AppError>;
    async fn list(&self) -> Result<Vec<Order>, AppError>;
    async fn set_assigned_courier(&self, order_id: Uuid, courier_id: Uuid) -> Result<Order, AppError>;
    async fn clear_assigned_courier(&self, order_id: Uuid) -> Result<Order, AppError>;
    async fn set_received(&self, order_id: Uuid, received: bool) -> Result<Order, AppError>;
    async fn list_active_by_courier(&self, courier_id: Uuid) -> Result<Vec<Order>, AppError>;
}

#[async_trait]
pub trait CourierStore: Send + Sync {
    async fn insert(&self, courier: Courier) -> Result<Courier, AppError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Courier>, AppError>;
    async fn get_by_chat_id(&self, chat_id: ChatId) -> Result<Option<Courier>, AppError>;
    async fn list(&self) -> Result<Vec<Courier>, AppError>;
    /// Active couriers in ascending id order.
    async fn list_active(&self) -> Result<Vec<Courier>, AppError>;
    async fn set_active(&self, courier_id: Uuid, active: bool) -> Result<Courier, AppError>;
    async fn set_current_order(&self, courier_id: Uuid, order_id: Option<Uuid>) -> Result<Courier, AppError>;
}

#[async_trait]
pub trait AssignmentStore: Send + Sync {
    async fn create(&self, assignment: Assignment) -> Result<Assignment, AppError>;
    /// Latest attempt for the order.
    async fn get_by_order_id(&self, order_id: Uuid) -> Result<Option<Assignment>, AppError>;
    async fn list_by_order(&self, order_id: Uuid) -> Result<Vec<Assignment>, AppError>;
    async fn list(&self) -> Result<Vec<Assignment>, AppError>;
    async fn list_waiting(&self) -> Result<Vec<Assignment>, AppError>;
    /// Moves the order's latest attempt from `expected` to `new`. Returns
    /// `None` without touching anything when the current status differs.
    async fn conditional_update_status(
        &self,
        order_id: Uuid,
        expected: AssignmentStatus,
        new: AssignmentStatus,
    ) -> Result<Option<Assignment>, AppError>;
    async fn list_excluded_couriers(&self, order_id: Uuid) -> Result<Vec<Uuid>, AppError>;
}

#[derive(Clone)]
pub struct Stores {
    pub orders: Arc<dyn OrderStore>,
    pub couriers: Arc<dyn CourierStore>,
    pub assignments: Arc<dyn AssignmentStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            orders: store.clone(),
            couriers: store.clone(),
            assignments: store,
        }
    }
}
