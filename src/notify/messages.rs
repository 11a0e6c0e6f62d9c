use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::Order;
use crate::notify::Button;

const ACCEPT_PREFIX: &str = "accept_";
const REJECT_PREFIX: &str = "reject_";

pub const TIME_IS_UP: &str = "Time to accept this order has run out.";

pub fn offer_text(order: &Order, expires_at: DateTime<Utc>) -> String {
    let due = order
        .delivery_due_at
        .map(|due| due.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "not set".to_string());

    format!(
        "New order #{id}\n\n\
         Delivery address: {address}\n\
         Customer: {surname} {name}\n\
         Deliver by: {due}\n\
         Order total: {total:.2}\n\
         Delivery fee: {fee:.2}\n\n\
         Accept or reject before {deadline}.",
        id = order.id,
        address = order.address,
        surname = order.customer.surname,
        name = order.customer.name,
        total = order.order_price,
        fee = order.delivery_price,
        deadline = expires_at.format("%H:%M:%S UTC"),
    )
}

pub fn offer_buttons(order_id: Uuid) -> Vec<Button> {
    vec![
        Button {
            text: "Accept".to_string(),
            data: format!("{ACCEPT_PREFIX}{order_id}"),
        },
        Button {
            text: "Reject".to_string(),
            data: format!("{REJECT_PREFIX}{order_id}"),
        },
    ]
}

pub fn delivery_details_text(order: &Order) -> String {
    let due = order
        .delivery_due_at
        .map(|due| due.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "not set".to_string());

    format!(
        "Delivery details #{id}\n\n\
         Address: {address}\n\
         Customer: {surname} {name}\n\
         Phone: {phone}\n\
         Deliver by: {due}\n\
         Order total: {total:.2}\n\
         Delivery fee: {fee:.2}\n\n\
         Call the customer 15 minutes before arrival.",
        id = order.id,
        address = order.address,
        surname = order.customer.surname,
        name = order.customer.name,
        phone = order.customer.phone,
        total = order.order_price,
        fee = order.delivery_price,
    )
}

pub fn accepted_text(order_id: Uuid) -> String {
    format!("Order #{order_id} is yours. Delivery details follow.")
}

pub fn rejected_text(order_id: Uuid) -> String {
    format!("You declined order #{order_id}. It will be offered to another courier.")
}

pub fn response_failed_text(order_id: Uuid, err: &AppError) -> String {
    format!("Could not process your answer for order #{order_id}: {err}")
}

pub fn parse_callback(data: &str) -> Option<(Uuid, bool)> {
    let (raw_id, accepted) = if let Some(rest) = data.strip_prefix(ACCEPT_PREFIX) {
        (rest, true)
    } else if let Some(rest) = data.strip_prefix(REJECT_PREFIX) {
        (rest, false)
    } else {
        return None;
    };

    Uuid::parse_str(raw_id).ok().map(|id| (id, accepted))
}
