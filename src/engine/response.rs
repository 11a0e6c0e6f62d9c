use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::engine::dispatcher::{log_notify_failure, Dispatcher};
use crate::error::AppError;
use crate::models::assignment::AssignmentStatus;
use crate::models::courier::{ChatId, Courier};
use crate::models::order::Order;
use crate::notify::messages;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseOutcome {
    Accepted,
    Rejected,
    Expired,
}

impl ResponseOutcome {
    fn status(self) -> AssignmentStatus {
        match self {
            ResponseOutcome::Accepted => AssignmentStatus::Accepted,
            ResponseOutcome::Rejected => AssignmentStatus::Rejected,
            ResponseOutcome::Expired => AssignmentStatus::Expired,
        }
    }

    pub fn label(self) -> &'static str {
        self.status().as_str()
    }
}

impl Dispatcher {
    pub async fn handle_courier_response(
        self: &Arc<Self>,
        chat_id: ChatId,
        order_id: Uuid,
        accepted: bool,
    ) -> Result<ResponseOutcome, AppError> {
        info!(chat_id, order_id = %order_id, accepted, "handling courier response");

        let courier = self.courier_by_chat(chat_id).await?;

        let (outcome, order) = {
            let _guard = self.locks.lock(order_id).await;

            let assignment = self
                .stores
                .assignments
                .get_by_order_id(order_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("no assignment for order {order_id}")))?;

            if assignment.courier_id != courier.id {
                return Err(AppError::Conflict(format!(
                    "order {order_id} is not offered to courier {}",
                    courier.id
                )));
            }

            if assignment.status.is_terminal() {
                return Err(AppError::Conflict(format!(
                    "assignment {} is already {}",
                    assignment.id,
                    assignment.status.as_str()
                )));
            }

            let outcome = if assignment.is_past_due(Utc::now()) {
                ResponseOutcome::Expired
            } else if accepted {
                ResponseOutcome::Accepted
            } else {
                ResponseOutcome::Rejected
            };

            let order = if outcome == ResponseOutcome::Accepted {
                Some(self.bind_order(order_id, &courier).await?)
            } else {
                None
            };

            let applied = self
                .stores
                .assignments
                .conditional_update_status(order_id, AssignmentStatus::Waiting, outcome.status())
                .await
                .and_then(|updated| {
                    updated.ok_or_else(|| {
                        AppError::Conflict(format!("assignment {} already resolved", assignment.id))
                    })
                });
            if let Err(err) = applied {
                if order.is_some() {
                    self.unbind_order(order_id, &courier).await;
                }
                return Err(err);
            }
            self.expiry.cancel(order_id, assignment.id);
            self.refresh_waiting_gauge();

            (outcome, order)
        };

        self.metrics
            .courier_responses_total
            .with_label_values(&[outcome.label()])
            .inc();
        info!(
            order_id = %order_id,
            courier_id = %courier.id,
            outcome = outcome.label(),
            "courier response applied"
        );

        match (outcome, order) {
            (ResponseOutcome::Accepted, Some(order)) => {
                let sent = self
                    .notifier
                    .send_confirmation(chat_id, &messages::accepted_text(order_id))
                    .await;
                log_notify_failure(sent, chat_id, order_id, "acceptance confirmation");

                let sent = self.notifier.send_delivery_details(chat_id, &order).await;
                log_notify_failure(sent, chat_id, order_id, "delivery details");
            }
            (ResponseOutcome::Rejected, _) => {
                let sent = self
                    .notifier
                    .send_confirmation(chat_id, &messages::rejected_text(order_id))
                    .await;
                log_notify_failure(sent, chat_id, order_id, "rejection acknowledgment");
                self.spawn_redispatch(order_id);
            }
            (ResponseOutcome::Expired, _) => {
                self.metrics.assignments_expired_total.inc();
                let sent = self
                    .notifier
                    .send_confirmation(chat_id, messages::TIME_IS_UP)
                    .await;
                log_notify_failure(sent, chat_id, order_id, "expiry notice");
                self.spawn_redispatch(order_id);
            }
            (ResponseOutcome::Accepted, None) => {}
        }

        Ok(outcome)
    }

    pub async fn complete_delivery(&self, chat_id: ChatId, order_id: Uuid) -> Result<Order, AppError> {
        let courier = self.courier_by_chat(chat_id).await?;

        let order = self
            .stores
            .orders
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

        if order.assigned_courier != Some(courier.id) {
            return Err(AppError::Conflict(format!(
                "order {order_id} is not assigned to courier {}",
                courier.id
            )));
        }
        if order.is_received {
            return Err(AppError::Conflict(format!("order {order_id} already delivered")));
        }

        let order = self.stores.orders.set_received(order_id, true).await?;
        if courier.current_order == Some(order_id) {
            self.stores.couriers.set_current_order(courier.id, None).await?;
        }

        info!(order_id = %order_id, courier_id = %courier.id, "order delivered");

        let sent = self
            .notifier
            .send_confirmation(chat_id, &format!("Order #{order_id} delivered. Thank you!"))
            .await;
        log_notify_failure(sent, chat_id, order_id, "delivery confirmation");

        Ok(order)
    }

    // The assignment stays Waiting until both sides are bound, so a failure
    // here leaves the offer open and its timer armed.
    async fn bind_order(&self, order_id: Uuid, courier: &Courier) -> Result<Order, AppError> {
        let order = self
            .stores
            .orders
            .set_assigned_courier(order_id, courier.id)
            .await?;

        if let Err(err) = self
            .stores
            .couriers
            .set_current_order(courier.id, Some(order_id))
            .await
        {
            self.unbind_order(order_id, courier).await;
            return Err(err);
        }

        Ok(order)
    }

    async fn unbind_order(&self, order_id: Uuid, courier: &Courier) {
        if let Err(err) = self.stores.orders.clear_assigned_courier(order_id).await {
            error!(order_id = %order_id, error = %err, "failed to roll back order binding");
        }
        if let Err(err) = self
            .stores
            .couriers
            .set_current_order(courier.id, courier.current_order)
            .await
        {
            error!(
                order_id = %order_id,
                courier_id = %courier.id,
                error = %err,
                "failed to roll back courier current order"
            );
        }
    }

    async fn courier_by_chat(&self, chat_id: ChatId) -> Result<Courier, AppError> {
        self.stores
            .couriers
            .get_by_chat_id(chat_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("no courier registered for chat {chat_id}")))
    }
}
