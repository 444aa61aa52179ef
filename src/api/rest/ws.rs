use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};

use crate::models::tracking::TrackingUpdate;
use crate::state::AppState;

/// Websocket frame: the courier update plus the shopper-facing status text.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrackingMessage<'a> {
    #[serde(flatten)]
    update: &'a TrackingUpdate,
    status_label: &'static str,
}

impl<'a> From<&'a TrackingUpdate> for TrackingMessage<'a> {
    fn from(update: &'a TrackingUpdate) -> Self {
        Self {
            update,
            status_label: update.status.label(),
        }
    }
}

pub async fn track_handler(
    ws: WebSocketUpgrade,
    Path(delivery_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_tracking(socket, state, delivery_id))
}

/// Streams tracking updates for one delivery until it reaches a terminal
/// status, the poller gives up, or the client goes away.
async fn stream_tracking(socket: WebSocket, state: Arc<AppState>, delivery_id: String) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = state
        .workflow
        .start_delivery_tracking(&delivery_id, move |update| {
            let _ = tx.send(update);
        });
    let mut updates = UnboundedReceiverStream::new(rx);

    info!(delivery_id = %delivery_id, "tracking client connected");

    let send_task = tokio::spawn(async move {
        while let Some(update) = updates.next().await {
            let terminal = update.status.is_terminal();
            let json = match serde_json::to_string(&TrackingMessage::from(&update)) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize tracking update for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                return;
            }
            if terminal {
                break;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    handle.cancel();
    info!(delivery_id = %delivery_id, "tracking client disconnected");
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::Value;

    use super::*;
    use crate::models::delivery::DeliveryStatus;

    #[test]
    fn frames_carry_the_status_label() {
        let update = TrackingUpdate {
            delivery_id: "dlv-1".to_string(),
            status: DeliveryStatus::PickedUp,
            location: None,
            timestamp: Utc::now(),
            partner_name: Some("Ravi".to_string()),
            estimated_arrival: Some(18),
            notes: None,
        };

        let frame: Value =
            serde_json::to_value(TrackingMessage::from(&update)).unwrap();

        assert_eq!(frame["deliveryId"], "dlv-1");
        assert_eq!(frame["status"], "picked_up");
        assert_eq!(frame["statusLabel"], "Order Picked Up");
        assert_eq!(frame["estimatedArrival"], 18);
        assert!(frame.get("location").is_none());
    }
}
