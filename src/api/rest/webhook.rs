use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Json;
use axum::Router;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::dispatcher::DispatchOutcome;
use crate::error::AppError;
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "x-signature";

type HmacSha256 = Hmac<Sha256>;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/webhooks/order-ready", post(order_ready))
}

#[derive(Deserialize)]
pub struct OrderReadyWebhook {
    pub order_id: Uuid,
}

#[derive(Serialize)]
pub struct WebhookAck {
    pub success: bool,
    pub message: String,
}

async fn order_ready(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookAck>), AppError> {
    if let Some(secret) = state.webhook_secret.as_deref() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing signature".to_string()))?;

        if !verify_signature(secret, &body, signature) {
            warn!("order-ready webhook with invalid signature");
            return Err(AppError::Unauthorized("invalid signature".to_string()));
        }
    }

    let webhook: OrderReadyWebhook = serde_json::from_slice(&body)
        .map_err(|err| AppError::BadRequest(format!("invalid payload: {err}")))?;
    let order_id = webhook.order_id;

    info!(order_id = %order_id, "order-ready webhook received");

    let dispatcher = state.dispatcher.clone();
    tokio::spawn(async move {
        let start = Instant::now();
        match dispatcher.process_new_order(order_id).await {
            Ok(DispatchOutcome::NoCourierAvailable) => {
                warn!(order_id = %order_id, "order left unassigned: no courier available")
            }
            Ok(outcome) => info!(
                order_id = %order_id,
                outcome = outcome.label(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "order dispatch finished"
            ),
            Err(err) => error!(order_id = %order_id, error = %err, "order dispatch failed"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(WebhookAck {
            success: true,
            message: "order processing started".to_string(),
        }),
    ))
}

/// Hex-encoded HMAC-SHA256 of the raw body, compared in constant time.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

pub fn sign(secret: &str, body: &[u8]) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|err| AppError::Internal(format!("invalid webhook secret: {err}")))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trip() {
        let body = br#"{"order_id":"00000000-0000-0000-0000-000000000001"}"#;
        let signature = sign("secret", body).unwrap();

        assert!(verify_signature("secret", body, &signature));
        assert!(!verify_signature("other", body, &signature));
        assert!(!verify_signature("secret", b"{}", &signature));
    }

    #[test]
    fn malformed_signature_is_rejected() {
        assert!(!verify_signature("secret", b"{}", "not-hex"));
        assert!(!verify_signature("secret", b"{}", ""));
    }
}
