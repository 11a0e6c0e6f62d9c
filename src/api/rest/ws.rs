use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::models::courier::ChatId;
use crate::engine::dispatcher::log_notify_failure;
use crate::notify::messages::{self, parse_callback};
use crate::notify::Notifier;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct WsParams {
    pub chat_id: ChatId,
}

#[derive(Deserialize)]
struct CallbackFrame {
    callback_data: String,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.chat_id))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, chat_id: ChatId) {
    let (mut sender, mut receiver) = socket.split();
    let mut session = state.notifier.connect(chat_id);
    let Some(rx) = session.take_receiver() else {
        return;
    };

    info!(chat_id, "courier device connected");

    let mut send_task = tokio::spawn(async move {
        let mut messages = tokio_stream::StreamExt::filter_map(BroadcastStream::new(rx), |result| {
            match result {
                Ok(message) if message.chat_id == chat_id => Some(message),
                Ok(_) => None,
                Err(err) => {
                    warn!(chat_id, error = %err, "courier message stream lagged");
                    None
                }
            }
        });

        while let Some(message) = messages.next().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize courier message for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let dispatcher = state.dispatcher.clone();
    let notifier = state.notifier.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let Message::Text(text) = msg else {
                continue;
            };

            let Some((order_id, accepted)) = serde_json::from_str::<CallbackFrame>(&text)
                .ok()
                .and_then(|frame| parse_callback(&frame.callback_data))
            else {
                warn!(chat_id, "ignoring unrecognized frame from courier device");
                continue;
            };

            if let Err(err) = dispatcher
                .handle_courier_response(chat_id, order_id, accepted)
                .await
            {
                warn!(chat_id, order_id = %order_id, error = %err, "courier response rejected");
                let sent = notifier
                    .send_confirmation(chat_id, &messages::response_failed_text(order_id, &err))
                    .await;
                log_notify_failure(sent, chat_id, order_id, "response failure notice");
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    drop(session);
    info!(chat_id, "courier device disconnected");
}
