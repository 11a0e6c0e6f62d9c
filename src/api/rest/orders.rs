use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::dispatcher::DispatchReport;
use crate::error::AppError;
use crate::models::assignment::Assignment;
use crate::models::order::{Customer, DeliveryAddress, Order};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/dispatch", post(dispatch_order))
        .route("/orders/:id/assignments", get(list_order_assignments))
        .route("/assignments", get(list_assignments))
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub customer: Customer,
    pub address: DeliveryAddress,
    pub order_price: f64,
    #[serde(default)]
    pub delivery_price: f64,
    #[serde(default)]
    pub is_paid: bool,
    #[serde(default)]
    pub is_assembled: bool,
    pub delivery_due_at: Option<DateTime<Utc>>,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    if payload.order_price < 0.0 || payload.delivery_price < 0.0 {
        return Err(AppError::BadRequest("prices cannot be negative".to_string()));
    }

    let order = Order {
        id: Uuid::new_v4(),
        customer: payload.customer,
        address: payload.address,
        order_price: payload.order_price,
        delivery_price: payload.delivery_price,
        is_paid: payload.is_paid,
        is_assembled: payload.is_assembled,
        is_received: false,
        delivery_due_at: payload.delivery_due_at,
        assigned_courier: None,
        created_at: Utc::now(),
        received_at: None,
    };

    let order = state.stores.orders.insert(order).await?;
    Ok(Json(order))
}

async fn list_orders(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Order>>, AppError> {
    Ok(Json(state.stores.orders.list().await?))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .stores
        .orders
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {} not found", id)))?;

    Ok(Json(order))
}

async fn dispatch_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DispatchReport>, AppError> {
    let outcome = state.dispatcher.process_new_order(id).await?;
    Ok(Json(outcome.report()))
}

async fn list_order_assignments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Assignment>>, AppError> {
    if state.stores.orders.get_by_id(id).await?.is_none() {
        return Err(AppError::NotFound(format!("order {} not found", id)));
    }

    Ok(Json(state.stores.assignments.list_by_order(id).await?))
}

async fn list_assignments(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Assignment>>, AppError> {
    Ok(Json(state.stores.assignments.list().await?))
}
