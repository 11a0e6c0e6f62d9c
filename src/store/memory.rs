use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::assignment::{Assignment, AssignmentStatus};
use crate::models::courier::{ChatId, Courier};
use crate::models::order::Order;
use crate::store::{AssignmentStore, CourierStore, OrderStore};

#[derive(Default)]
pub struct MemoryStore {
    orders: DashMap<Uuid, Order>,
    couriers: DashMap<Uuid, Courier>,
    couriers_by_chat: DashMap<ChatId, Uuid>,
    assignments: DashMap<Uuid, Vec<Assignment>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn order_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("order {id} not found"))
}

fn courier_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("courier {id} not found"))
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert(&self, order: Order) -> Result<Order, AppError> {
        self.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Order>, AppError> {
        Ok(self.orders.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list(&self) -> Result<Vec<Order>, AppError> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by_key(|order| order.created_at);
        Ok(orders)
    }

    async fn set_assigned_courier(&self, order_id: Uuid, courier_id: Uuid) -> Result<Order, AppError> {
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| order_not_found(order_id))?;

        let current = order.assigned_courier;
        match current {
            Some(existing) if existing != courier_id => Err(AppError::Conflict(format!(
                "order {order_id} already assigned to courier {existing}"
            ))),
            _ => {
                order.assigned_courier = Some(courier_id);
                Ok(order.clone())
            }
        }
    }

    async fn clear_assigned_courier(&self, order_id: Uuid) -> Result<Order, AppError> {
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| order_not_found(order_id))?;

        order.assigned_courier = None;
        Ok(order.clone())
    }

    async fn set_received(&self, order_id: Uuid, received: bool) -> Result<Order, AppError> {
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| order_not_found(order_id))?;

        order.is_received = received;
        order.received_at = received.then(Utc::now);
        Ok(order.clone())
    }

    async fn list_active_by_courier(&self, courier_id: Uuid) -> Result<Vec<Order>, AppError> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| {
                let order = entry.value();
                order.assigned_courier == Some(courier_id) && !order.is_received
            })
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by_key(|order| order.delivery_due_at);
        Ok(orders)
    }
}

#[async_trait]
impl CourierStore for MemoryStore {
    async fn insert(&self, courier: Courier) -> Result<Courier, AppError> {
        match self.couriers_by_chat.entry(courier.chat_id) {
            Entry::Occupied(owner) => {
                if *owner.get() != courier.id {
                    return Err(AppError::Conflict(format!(
                        "chat {} already registered to courier {}",
                        courier.chat_id,
                        owner.get()
                    )));
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(courier.id);
            }
        }

        self.couriers.insert(courier.id, courier.clone());
        Ok(courier)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Courier>, AppError> {
        Ok(self.couriers.get(&id).map(|entry| entry.value().clone()))
    }

    async fn get_by_chat_id(&self, chat_id: ChatId) -> Result<Option<Courier>, AppError> {
        let Some(id) = self.couriers_by_chat.get(&chat_id).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        Ok(self.couriers.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list(&self) -> Result<Vec<Courier>, AppError> {
        let mut couriers: Vec<Courier> = self
            .couriers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        couriers.sort_by_key(|courier| courier.id);
        Ok(couriers)
    }

    async fn list_active(&self) -> Result<Vec<Courier>, AppError> {
        let mut couriers: Vec<Courier> = self
            .couriers
            .iter()
            .filter(|entry| entry.value().is_active)
            .map(|entry| entry.value().clone())
            .collect();
        couriers.sort_by_key(|courier| courier.id);
        Ok(couriers)
    }

    async fn set_active(&self, courier_id: Uuid, active: bool) -> Result<Courier, AppError> {
        let mut courier = self
            .couriers
            .get_mut(&courier_id)
            .ok_or_else(|| courier_not_found(courier_id))?;

        courier.is_active = active;
        courier.updated_at = Utc::now();
        Ok(courier.clone())
    }

    async fn set_current_order(&self, courier_id: Uuid, order_id: Option<Uuid>) -> Result<Courier, AppError> {
        let mut courier = self
            .couriers
            .get_mut(&courier_id)
            .ok_or_else(|| courier_not_found(courier_id))?;

        courier.current_order = order_id;
        courier.updated_at = Utc::now();
        Ok(courier.clone())
    }
}

#[async_trait]
impl AssignmentStore for MemoryStore {
    async fn create(&self, assignment: Assignment) -> Result<Assignment, AppError> {
        let mut attempts = self.assignments.entry(assignment.order_id).or_default();

        if let Some(waiting) = attempts
            .iter()
            .find(|existing| existing.status == AssignmentStatus::Waiting)
        {
            return Err(AppError::Conflict(format!(
                "order {} already has waiting assignment {}",
                assignment.order_id, waiting.id
            )));
        }

        attempts.push(assignment.clone());
        Ok(assignment)
    }

    async fn get_by_order_id(&self, order_id: Uuid) -> Result<Option<Assignment>, AppError> {
        Ok(self
            .assignments
            .get(&order_id)
            .and_then(|attempts| attempts.last().cloned()))
    }

    async fn list_by_order(&self, order_id: Uuid) -> Result<Vec<Assignment>, AppError> {
        Ok(self
            .assignments
            .get(&order_id)
            .map(|attempts| attempts.value().clone())
            .unwrap_or_default())
    }

    async fn list(&self) -> Result<Vec<Assignment>, AppError> {
        let mut all: Vec<Assignment> = self
            .assignments
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        all.sort_by_key(|assignment| assignment.assigned_at);
        Ok(all)
    }

    async fn list_waiting(&self) -> Result<Vec<Assignment>, AppError> {
        Ok(self
            .assignments
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .iter()
                    .find(|assignment| assignment.status == AssignmentStatus::Waiting)
                    .cloned()
            })
            .collect())
    }

    async fn conditional_update_status(
        &self,
        order_id: Uuid,
        expected: AssignmentStatus,
        new: AssignmentStatus,
    ) -> Result<Option<Assignment>, AppError> {
        let mut attempts = self.assignments.get_mut(&order_id).ok_or_else(|| {
            AppError::NotFound(format!("no assignment for order {order_id}"))
        })?;

        let latest = attempts.last_mut().ok_or_else(|| {
            AppError::NotFound(format!("no assignment for order {order_id}"))
        })?;

        if latest.status != expected {
            return Ok(None);
        }

        latest.status = new;
        Ok(Some(latest.clone()))
    }

    async fn list_excluded_couriers(&self, order_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let mut excluded: Vec<Uuid> = self
            .assignments
            .get(&order_id)
            .map(|attempts| {
                attempts
                    .iter()
                    .filter(|assignment| assignment.status.excludes_courier())
                    .map(|assignment| assignment.courier_id)
                    .collect()
            })
            .unwrap_or_default();
        excluded.sort();
        excluded.dedup();
        Ok(excluded)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn courier(seed: u128, chat_id: ChatId, active: bool) -> Courier {
        Courier {
            id: Uuid::from_u128(seed),
            chat_id,
            name: format!("courier-{seed}"),
            phone: String::new(),
            is_active: active,
            current_order: None,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn active_couriers_are_sorted_by_id() {
        let store = MemoryStore::new();
        CourierStore::insert(&store, courier(3, 30, true)).await.unwrap();
        CourierStore::insert(&store, courier(1, 10, true)).await.unwrap();
        CourierStore::insert(&store, courier(2, 20, false)).await.unwrap();

        let active = store.list_active().await.unwrap();
        let ids: Vec<Uuid> = active.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![Uuid::from_u128(1), Uuid::from_u128(3)]);
    }

    #[tokio::test]
    async fn chat_id_cannot_be_reused_by_another_courier() {
        let store = MemoryStore::new();
        CourierStore::insert(&store, courier(1, 10, true)).await.unwrap();

        let err = CourierStore::insert(&store, courier(2, 10, true)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let found = store.get_by_chat_id(10).await.unwrap().unwrap();
        assert_eq!(found.id, Uuid::from_u128(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_registrations_share_one_chat_id_once() {
        let store = std::sync::Arc::new(MemoryStore::new());

        let handles: Vec<_> = (1..=8u128)
            .map(|seed| {
                let store = store.clone();
                tokio::spawn(async move { CourierStore::insert(store.as_ref(), courier(seed, 10, true)).await })
            })
            .collect();

        let mut registered = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                registered += 1;
            }
        }

        assert_eq!(registered, 1);
        assert_eq!(CourierStore::list(store.as_ref()).await.unwrap().len(), 1);
        let owner = store.get_by_chat_id(10).await.unwrap().unwrap();
        assert_eq!(store.couriers_by_chat.get(&10).map(|id| *id), Some(owner.id));
    }

    #[tokio::test]
    async fn cleared_order_can_be_bound_again() {
        let store = MemoryStore::new();
        let order = crate::models::order::Order {
            id: Uuid::new_v4(),
            customer: crate::models::order::Customer {
                name: "Anna".to_string(),
                surname: "Petrova".to_string(),
                phone: String::new(),
            },
            address: crate::models::order::DeliveryAddress {
                city: "Kazan".to_string(),
                street: "Baumana 1".to_string(),
                flat: String::new(),
                entrance: String::new(),
            },
            order_price: 100.0,
            delivery_price: 10.0,
            is_paid: true,
            is_assembled: true,
            is_received: false,
            delivery_due_at: Some(Utc::now()),
            assigned_courier: None,
            created_at: Utc::now(),
            received_at: None,
        };
        let order_id = order.id;
        OrderStore::insert(&store, order).await.unwrap();

        store.set_assigned_courier(order_id, Uuid::from_u128(1)).await.unwrap();
        let err = store.set_assigned_courier(order_id, Uuid::from_u128(2)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let cleared = store.clear_assigned_courier(order_id).await.unwrap();
        assert!(cleared.assigned_courier.is_none());
        let rebound = store.set_assigned_courier(order_id, Uuid::from_u128(2)).await.unwrap();
        assert_eq!(rebound.assigned_courier, Some(Uuid::from_u128(2)));
    }

    #[tokio::test]
    async fn second_waiting_assignment_is_refused() {
        let store = MemoryStore::new();
        let order_id = Uuid::new_v4();

        AssignmentStore::create(&store, Assignment::new(order_id, Uuid::from_u128(1), Duration::minutes(1)))
            .await
            .unwrap();
        let err = AssignmentStore::create(&store, Assignment::new(order_id, Uuid::from_u128(2), Duration::minutes(1)))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.list_by_order(order_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn conditional_update_only_applies_to_expected_status() {
        let store = MemoryStore::new();
        let order_id = Uuid::new_v4();
        AssignmentStore::create(&store, Assignment::new(order_id, Uuid::from_u128(1), Duration::minutes(1)))
            .await
            .unwrap();

        let first = store
            .conditional_update_status(order_id, AssignmentStatus::Waiting, AssignmentStatus::Accepted)
            .await
            .unwrap();
        assert_eq!(first.unwrap().status, AssignmentStatus::Accepted);

        let second = store
            .conditional_update_status(order_id, AssignmentStatus::Waiting, AssignmentStatus::Expired)
            .await
            .unwrap();
        assert!(second.is_none());

        let current = store.get_by_order_id(order_id).await.unwrap().unwrap();
        assert_eq!(current.status, AssignmentStatus::Accepted);
    }

    #[tokio::test]
    async fn excluded_couriers_skip_accepted_and_waiting() {
        let store = MemoryStore::new();
        let order_id = Uuid::new_v4();

        for (seed, outcome) in [(1, AssignmentStatus::Rejected), (2, AssignmentStatus::Expired)] {
            AssignmentStore::create(&store, Assignment::new(order_id, Uuid::from_u128(seed), Duration::minutes(1)))
                .await
                .unwrap();
            store
                .conditional_update_status(order_id, AssignmentStatus::Waiting, outcome)
                .await
                .unwrap();
        }
        AssignmentStore::create(&store, Assignment::new(order_id, Uuid::from_u128(3), Duration::minutes(1)))
            .await
            .unwrap();

        let excluded = store.list_excluded_couriers(order_id).await.unwrap();
        assert_eq!(excluded, vec![Uuid::from_u128(1), Uuid::from_u128(2)]);
        assert_eq!(store.list_waiting().await.unwrap().len(), 1);
    }
}
