use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::response::ResponseOutcome;
use crate::error::AppError;
use crate::models::courier::{ChatId, Courier};
use crate::models::order::Order;
use crate::notify::messages::parse_callback;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/couriers", post(create_courier).get(list_couriers))
        .route("/couriers/:id/active", patch(update_courier_active))
        .route("/couriers/:id/orders", get(list_courier_orders))
        .route("/couriers/responses", post(courier_response))
        .route("/couriers/deliveries", post(confirm_delivery))
}

#[derive(Deserialize)]
pub struct CreateCourierRequest {
    pub chat_id: ChatId,
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Deserialize)]
pub struct UpdateActiveRequest {
    pub active: bool,
}

#[derive(Deserialize)]
pub struct CourierResponseRequest {
    pub chat_id: ChatId,
    pub order_id: Option<Uuid>,
    pub accepted: Option<bool>,
    pub callback_data: Option<String>,
}

#[derive(Serialize)]
pub struct CourierResponseBody {
    pub order_id: Uuid,
    pub outcome: ResponseOutcome,
}

#[derive(Deserialize)]
pub struct DeliveryConfirmationRequest {
    pub chat_id: ChatId,
    pub order_id: Uuid,
}

async fn create_courier(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCourierRequest>,
) -> Result<Json<Courier>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let courier = Courier {
        id: Uuid::new_v4(),
        chat_id: payload.chat_id,
        name: payload.name,
        phone: payload.phone,
        is_active: payload.active,
        current_order: None,
        updated_at: Utc::now(),
    };

    let courier = state.stores.couriers.insert(courier).await?;
    Ok(Json(courier))
}

async fn list_couriers(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Courier>>, AppError> {
    Ok(Json(state.stores.couriers.list().await?))
}

async fn update_courier_active(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateActiveRequest>,
) -> Result<Json<Courier>, AppError> {
    let courier = state.stores.couriers.set_active(id, payload.active).await?;
    Ok(Json(courier))
}

async fn list_courier_orders(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Order>>, AppError> {
    if state.stores.couriers.get_by_id(id).await?.is_none() {
        return Err(AppError::NotFound(format!("courier {id} not found")));
    }

    Ok(Json(state.stores.orders.list_active_by_courier(id).await?))
}

async fn courier_response(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CourierResponseRequest>,
) -> Result<Json<CourierResponseBody>, AppError> {
    let (order_id, accepted) = match (payload.order_id, payload.accepted, payload.callback_data) {
        (Some(order_id), Some(accepted), None) => (order_id, accepted),
        (None, None, Some(data)) => parse_callback(&data)
            .ok_or_else(|| AppError::BadRequest(format!("unrecognized callback data: {data}")))?,
        _ => {
            return Err(AppError::BadRequest(
                "provide either order_id and accepted, or callback_data".to_string(),
            ));
        }
    };

    let outcome = state
        .dispatcher
        .handle_courier_response(payload.chat_id, order_id, accepted)
        .await?;

    Ok(Json(CourierResponseBody { order_id, outcome }))
}

async fn confirm_delivery(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DeliveryConfirmationRequest>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .dispatcher
        .complete_delivery(payload.chat_id, payload.order_id)
        .await?;
    Ok(Json(order))
}
