use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Per-order serialization point for assignment transitions.
#[derive(Default, Clone)]
pub struct OrderLocks {
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, order_id: Uuid) -> OrderGuard {
        let mutex = self
            .locks
            .entry(order_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();

        OrderGuard {
            guard: Some(mutex.lock_owned().await),
            order_id,
            locks: self.locks.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

pub struct OrderGuard {
    guard: Option<OwnedMutexGuard<()>>,
    order_id: Uuid,
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl Drop for OrderGuard {
    fn drop(&mut self) {
        // Release first so our own Arc no longer counts.
        self.guard.take();
        self.locks
            .remove_if(&self.order_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
