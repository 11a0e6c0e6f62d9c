use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::expiry::{ExpiryEvent, ExpiryScheduler};
use crate::engine::locks::OrderLocks;
use crate::engine::selector::select_candidate;
use crate::error::AppError;
use crate::models::assignment::{Assignment, AssignmentStatus};
use crate::models::courier::ChatId;
use crate::models::order::Order;
use crate::notify::{messages, Notifier, NotifyError};
use crate::observability::metrics::Metrics;
use crate::store::Stores;

#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    pub assignment_timeout: Duration,
    /// Upper bound on offers per order. `None` keeps offering until every
    /// active courier has been asked.
    pub max_attempts: Option<u32>,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            assignment_timeout: Duration::from_secs(600),
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Dispatched { assignment_id: Uuid, courier_id: Uuid },
    AlreadyInFlight { assignment_id: Uuid },
    NoCourierAvailable,
    AttemptLimitReached { attempts: u32 },
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub dispatched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub courier_id: Option<Uuid>,
}

impl DispatchOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, DispatchOutcome::Dispatched { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            DispatchOutcome::Dispatched { .. } => "dispatched",
            DispatchOutcome::AlreadyInFlight { .. } => "already_in_flight",
            DispatchOutcome::NoCourierAvailable => "no_courier_available",
            DispatchOutcome::AttemptLimitReached { .. } => "attempt_limit_reached",
        }
    }

    pub fn report(&self) -> DispatchReport {
        match *self {
            DispatchOutcome::Dispatched {
                assignment_id,
                courier_id,
            } => DispatchReport {
                dispatched: true,
                reason: None,
                assignment_id: Some(assignment_id),
                courier_id: Some(courier_id),
            },
            DispatchOutcome::AlreadyInFlight { assignment_id } => DispatchReport {
                dispatched: false,
                reason: Some(self.label()),
                assignment_id: Some(assignment_id),
                courier_id: None,
            },
            DispatchOutcome::NoCourierAvailable | DispatchOutcome::AttemptLimitReached { .. } => {
                DispatchReport {
                    dispatched: false,
                    reason: Some(self.label()),
                    assignment_id: None,
                    courier_id: None,
                }
            }
        }
    }
}

/// Every assignment transition for an order happens while holding that
/// order's lock; notifications go out after the lock is released.
pub struct Dispatcher {
    pub(crate) stores: Stores,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) expiry: ExpiryScheduler,
    pub(crate) locks: OrderLocks,
    pub(crate) metrics: Metrics,
    policy: DispatchPolicy,
}

impl Dispatcher {
    pub fn new(
        stores: Stores,
        notifier: Arc<dyn Notifier>,
        policy: DispatchPolicy,
        metrics: Metrics,
        event_buffer_size: usize,
    ) -> (Self, mpsc::Receiver<ExpiryEvent>) {
        let (expiry, expiry_rx) = ExpiryScheduler::new(event_buffer_size);

        (
            Self {
                stores,
                notifier,
                expiry,
                locks: OrderLocks::new(),
                metrics,
                policy,
            },
            expiry_rx,
        )
    }

    pub fn armed_timers(&self) -> usize {
        self.expiry.armed()
    }

    pub async fn process_new_order(&self, order_id: Uuid) -> Result<DispatchOutcome, AppError> {
        info!(order_id = %order_id, "processing new order");
        self.dispatch(order_id).await
    }

    pub async fn redispatch(&self, order_id: Uuid) -> Result<DispatchOutcome, AppError> {
        info!(order_id = %order_id, "redispatching order");
        self.dispatch(order_id).await
    }

    pub fn spawn_redispatch(self: &Arc<Self>, order_id: Uuid) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher.redispatch_logged(order_id).await;
        });
    }

    pub(crate) async fn redispatch_logged(&self, order_id: Uuid) {
        match self.redispatch(order_id).await {
            Ok(DispatchOutcome::NoCourierAvailable) => {
                warn!(order_id = %order_id, "redispatch exhausted: no courier left to offer")
            }
            Ok(DispatchOutcome::AttemptLimitReached { attempts }) => {
                warn!(order_id = %order_id, attempts, "redispatch stopped: attempt limit reached")
            }
            Ok(outcome) => debug!(order_id = %order_id, outcome = outcome.label(), "redispatch finished"),
            Err(err) => error!(order_id = %order_id, error = %err, "redispatch failed"),
        }
    }

    async fn dispatch(&self, order_id: Uuid) -> Result<DispatchOutcome, AppError> {
        let start = Instant::now();
        let result = self.try_dispatch(order_id).await;

        let label = match &result {
            Ok(outcome) => outcome.label(),
            Err(AppError::Validation(_)) => "invalid_order",
            Err(_) => "error",
        };
        self.metrics
            .dispatch_latency_seconds
            .with_label_values(&[label])
            .observe(start.elapsed().as_secs_f64());
        self.metrics
            .dispatch_attempts_total
            .with_label_values(&[label])
            .inc();

        result
    }

    async fn try_dispatch(&self, order_id: Uuid) -> Result<DispatchOutcome, AppError> {
        let timeout = chrono::Duration::from_std(self.policy.assignment_timeout)
            .map_err(|err| AppError::Internal(format!("invalid assignment timeout: {err}")))?;

        let (order, chat_id, assignment) = {
            let _guard = self.locks.lock(order_id).await;

            let order = self
                .stores
                .orders
                .get_by_id(order_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
            validate_order(&order)?;

            let attempts = self.stores.assignments.list_by_order(order_id).await?;
            if let Some(waiting) = attempts
                .iter()
                .find(|attempt| attempt.status == AssignmentStatus::Waiting)
            {
                debug!(
                    order_id = %order_id,
                    assignment_id = %waiting.id,
                    "offer already in flight; skipping"
                );
                return Ok(DispatchOutcome::AlreadyInFlight {
                    assignment_id: waiting.id,
                });
            }

            if let Some(max_attempts) = self.policy.max_attempts {
                let made = attempts.len() as u32;
                if made >= max_attempts {
                    return Ok(DispatchOutcome::AttemptLimitReached { attempts: made });
                }
            }

            let Some(courier) = select_candidate(
                self.stores.couriers.as_ref(),
                self.stores.assignments.as_ref(),
                order_id,
            )
            .await?
            else {
                warn!(order_id = %order_id, "no eligible courier for order");
                return Ok(DispatchOutcome::NoCourierAvailable);
            };

            let assignment = self
                .stores
                .assignments
                .create(Assignment::new(order_id, courier.id, timeout))
                .await?;
            self.expiry.arm(&assignment);
            self.refresh_waiting_gauge();

            (order, courier.chat_id, assignment)
        };

        info!(
            order_id = %order_id,
            courier_id = %assignment.courier_id,
            assignment_id = %assignment.id,
            expires_at = %assignment.expires_at,
            "order offered to courier"
        );

        let sent = self
            .notifier
            .send_offer(chat_id, &order, assignment.expires_at)
            .await;
        log_notify_failure(sent, chat_id, order_id, "offer");

        Ok(DispatchOutcome::Dispatched {
            assignment_id: assignment.id,
            courier_id: assignment.courier_id,
        })
    }

    pub async fn expire(&self, event: ExpiryEvent) -> Result<bool, AppError> {
        let expired = {
            let _guard = self.locks.lock(event.order_id).await;

            let current = self.stores.assignments.get_by_order_id(event.order_id).await?;
            let Some(current) = current.filter(|current| current.id == event.assignment_id) else {
                self.expiry.cancel(event.order_id, event.assignment_id);
                debug!(
                    order_id = %event.order_id,
                    assignment_id = %event.assignment_id,
                    "expiry for superseded assignment ignored"
                );
                return Ok(false);
            };

            if current.status.is_terminal() {
                self.expiry.cancel(event.order_id, event.assignment_id);
                self.refresh_waiting_gauge();
                debug!(
                    order_id = %event.order_id,
                    assignment_id = %event.assignment_id,
                    status = current.status.as_str(),
                    "expiry for resolved assignment ignored"
                );
                return Ok(false);
            }

            if !current.is_past_due(Utc::now()) {
                // Woke up ahead of the stored deadline; wait out the rest.
                self.expiry.arm(&current);
                return Ok(false);
            }

            self.expiry.cancel(event.order_id, event.assignment_id);
            let updated = self
                .stores
                .assignments
                .conditional_update_status(
                    event.order_id,
                    AssignmentStatus::Waiting,
                    AssignmentStatus::Expired,
                )
                .await?;
            self.refresh_waiting_gauge();
            updated
        };

        let Some(assignment) = expired else {
            return Ok(false);
        };

        self.metrics.assignments_expired_total.inc();
        info!(
            order_id = %assignment.order_id,
            courier_id = %assignment.courier_id,
            assignment_id = %assignment.id,
            "assignment expired without an answer"
        );

        if let Some(courier) = self.stores.couriers.get_by_id(assignment.courier_id).await? {
            let sent = self
                .notifier
                .send_confirmation(courier.chat_id, messages::TIME_IS_UP)
                .await;
            log_notify_failure(sent, courier.chat_id, assignment.order_id, "expiry notice");
        }

        self.redispatch_logged(assignment.order_id).await;
        Ok(true)
    }

    pub async fn sweep_expired(&self) -> Result<usize, AppError> {
        let now = Utc::now();
        let overdue: Vec<Assignment> = self
            .stores
            .assignments
            .list_waiting()
            .await?
            .into_iter()
            .filter(|assignment| assignment.is_past_due(now))
            .collect();

        let mut expired = 0;
        for assignment in overdue {
            let event = ExpiryEvent {
                order_id: assignment.order_id,
                assignment_id: assignment.id,
            };
            match self.expire(event).await {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(err) => error!(
                    order_id = %assignment.order_id,
                    assignment_id = %assignment.id,
                    error = %err,
                    "sweep failed to expire assignment"
                ),
            }
        }

        Ok(expired)
    }

    pub async fn restore_timers(&self) -> Result<usize, AppError> {
        let waiting = self.stores.assignments.list_waiting().await?;
        let mut restored = 0;

        for assignment in waiting {
            let _guard = self.locks.lock(assignment.order_id).await;
            let still_waiting = self
                .stores
                .assignments
                .get_by_order_id(assignment.order_id)
                .await?
                .is_some_and(|current| {
                    current.id == assignment.id && current.status == AssignmentStatus::Waiting
                });
            if still_waiting {
                self.expiry.arm(&assignment);
                restored += 1;
            }
        }

        self.refresh_waiting_gauge();
        info!(restored, "expiry timers restored from store");
        Ok(restored)
    }

    pub(crate) fn refresh_waiting_gauge(&self) {
        self.metrics
            .waiting_assignments
            .set(self.expiry.armed() as i64);
    }
}

fn validate_order(order: &Order) -> Result<(), AppError> {
    if !order.is_paid {
        return Err(AppError::Validation(format!("order {} is not paid", order.id)));
    }

    if !order.is_assembled {
        return Err(AppError::Validation(format!(
            "order {} is not assembled",
            order.id
        )));
    }

    if let Some(courier_id) = order.assigned_courier {
        return Err(AppError::Validation(format!(
            "order {} already assigned to courier {courier_id}",
            order.id
        )));
    }

    if order.delivery_due_at.is_none() {
        return Err(AppError::Validation(format!(
            "order {} has no delivery date",
            order.id
        )));
    }

    Ok(())
}

pub(crate) fn log_notify_failure(
    result: Result<(), NotifyError>,
    chat_id: ChatId,
    order_id: Uuid,
    what: &'static str,
) {
    if let Err(err) = result {
        warn!(
            chat_id,
            order_id = %order_id,
            error = %err,
            "failed to deliver {what} to courier"
        );
    }
}
