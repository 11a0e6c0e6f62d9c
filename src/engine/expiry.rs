use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::dispatcher::Dispatcher;
use crate::models::assignment::Assignment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryEvent {
    pub order_id: Uuid,
    pub assignment_id: Uuid,
}

struct ArmedTimer {
    assignment_id: Uuid,
    handle: JoinHandle<()>,
}

/// One single-shot timer per order. A timer only emits an [`ExpiryEvent`];
/// deciding whether the assignment actually expires is left to the
/// dispatcher, which re-reads the store under the order lock.
pub struct ExpiryScheduler {
    timers: DashMap<Uuid, ArmedTimer>,
    tx: mpsc::Sender<ExpiryEvent>,
}

impl ExpiryScheduler {
    pub fn new(buffer_size: usize) -> (Self, mpsc::Receiver<ExpiryEvent>) {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        (
            Self {
                timers: DashMap::new(),
                tx,
            },
            rx,
        )
    }

    pub fn arm(&self, assignment: &Assignment) {
        let delay = (assignment.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let event = ExpiryEvent {
            order_id: assignment.order_id,
            assignment_id: assignment.id,
        };
        let tx = self.tx.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(event).await.is_err() {
                warn!(
                    order_id = %event.order_id,
                    assignment_id = %event.assignment_id,
                    "expiry event dropped: worker stopped"
                );
            }
        });

        let previous = self.timers.insert(
            assignment.order_id,
            ArmedTimer {
                assignment_id: assignment.id,
                handle,
            },
        );
        if let Some(previous) = previous {
            previous.handle.abort();
        }

        debug!(
            order_id = %assignment.order_id,
            assignment_id = %assignment.id,
            delay_ms = delay.as_millis() as u64,
            "expiry timer armed"
        );
    }

    pub fn cancel(&self, order_id: Uuid, assignment_id: Uuid) -> bool {
        match self
            .timers
            .remove_if(&order_id, |_, timer| timer.assignment_id == assignment_id)
        {
            Some((_, timer)) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, order_id: Uuid) -> bool {
        self.timers.contains_key(&order_id)
    }

    pub fn armed(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for ExpiryScheduler {
    fn drop(&mut self) {
        for entry in self.timers.iter() {
            entry.value().handle.abort();
        }
    }
}

pub async fn run_expiry_worker(dispatcher: Arc<Dispatcher>, mut rx: mpsc::Receiver<ExpiryEvent>) {
    info!("expiry worker started");

    while let Some(event) = rx.recv().await {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            if let Err(err) = dispatcher.expire(event).await {
                error!(
                    order_id = %event.order_id,
                    assignment_id = %event.assignment_id,
                    error = %err,
                    "failed to expire assignment"
                );
            }
        });
    }

    warn!("expiry worker stopped: event channel closed");
}

pub async fn run_expiry_sweeper(dispatcher: Arc<Dispatcher>, period: Duration) {
    info!(period_secs = period.as_secs(), "expiry sweeper started");

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match dispatcher.sweep_expired().await {
            Ok(0) => {}
            Ok(expired) => info!(expired, "sweep expired overdue assignments"),
            Err(err) => error!(error = %err, "expiry sweep failed"),
        }
    }
}
