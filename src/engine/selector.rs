use std::collections::HashSet;

use uuid::Uuid;

use crate::error::AppError;
use crate::models::courier::Courier;
use crate::store::{AssignmentStore, CourierStore};

pub async fn select_candidate(
    couriers: &dyn CourierStore,
    assignments: &dyn AssignmentStore,
    order_id: Uuid,
) -> Result<Option<Courier>, AppError> {
    let active = couriers.list_active().await?;
    if active.is_empty() {
        return Ok(None);
    }

    let excluded: HashSet<Uuid> = assignments
        .list_excluded_couriers(order_id)
        .await?
        .into_iter()
        .collect();

    Ok(active
        .into_iter()
        .filter(|courier| courier.is_active && !excluded.contains(&courier.id))
        .min_by_key(|courier| courier.id))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::models::assignment::{Assignment, AssignmentStatus};
    use crate::store::Stores;

    fn courier(seed: u128, active: bool) -> Courier {
        Courier {
            id: Uuid::from_u128(seed),
            chat_id: seed as i64,
            name: format!("courier-{seed}"),
            phone: String::new(),
            is_active: active,
            current_order: None,
            updated_at: Utc::now(),
        }
    }

    async fn close_attempt(stores: &Stores, order_id: Uuid, courier_seed: u128, status: AssignmentStatus) {
        stores
            .assignments
            .create(Assignment::new(order_id, Uuid::from_u128(courier_seed), Duration::minutes(1)))
            .await
            .unwrap();
        stores
            .assignments
            .conditional_update_status(order_id, AssignmentStatus::Waiting, status)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn picks_lowest_active_id() {
        let stores = Stores::in_memory();
        for c in [courier(3, true), courier(1, false), courier(2, true)] {
            stores.couriers.insert(c).await.unwrap();
        }

        let picked = select_candidate(stores.couriers.as_ref(), stores.assignments.as_ref(), Uuid::new_v4())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(picked.id, Uuid::from_u128(2));
    }

    #[tokio::test]
    async fn skips_couriers_that_rejected_or_expired() {
        let stores = Stores::in_memory();
        for seed in 1..=3 {
            stores.couriers.insert(courier(seed, true)).await.unwrap();
        }
        let order_id = Uuid::new_v4();
        close_attempt(&stores, order_id, 1, AssignmentStatus::Rejected).await;
        close_attempt(&stores, order_id, 2, AssignmentStatus::Expired).await;

        let picked = select_candidate(stores.couriers.as_ref(), stores.assignments.as_ref(), order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(picked.id, Uuid::from_u128(3));

        // Exclusions are per order.
        let other = select_candidate(stores.couriers.as_ref(), stores.assignments.as_ref(), Uuid::new_v4())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(other.id, Uuid::from_u128(1));
    }

    #[tokio::test]
    async fn none_when_everyone_is_excluded() {
        let stores = Stores::in_memory();
        stores.couriers.insert(courier(1, true)).await.unwrap();
        let order_id = Uuid::new_v4();
        close_attempt(&stores, order_id, 1, AssignmentStatus::Rejected).await;

        let picked = select_candidate(stores.couriers.as_ref(), stores.assignments.as_ref(), order_id)
            .await
            .unwrap();
        assert!(picked.is_none());
    }

    #[tokio::test]
    async fn none_without_active_couriers() {
        let stores = Stores::in_memory();
        stores.couriers.insert(courier(1, false)).await.unwrap();

        let picked = select_candidate(stores.couriers.as_ref(), stores.assignments.as_ref(), Uuid::new_v4())
            .await
            .unwrap();
        assert!(picked.is_none());
    }
}
