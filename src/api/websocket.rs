//! WebSocket transport for live telemetry sessions

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::state::ApiState;
use crate::gateway::{GatewaySession, Inbound, Outbound};

/// WebSocket upgrade handler
///
/// GET /docker/stats
pub async fn stats_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

/// Bridge the socket to a gateway session until the session ends
async fn handle_websocket(socket: WebSocket, state: ApiState) {
    info!("live telemetry client connected");

    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel(state.gateway.outbound_capacity);
    let (inbound_tx, inbound_rx) = mpsc::channel(16);

    let session = GatewaySession::new(state.ctx.clone(), state.gateway, outbound_tx, inbound_rx);
    let session_task = tokio::spawn(session.run());

    // Forward session frames to the socket
    let send_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let message = match frame {
                Outbound::Event(event) => match event.to_json() {
                    Ok(text) => Message::Text(text),
                    Err(e) => {
                        warn!("failed to encode gateway event: {}", e);
                        continue;
                    }
                },
                Outbound::Ping => Message::Ping(Vec::new()),
                Outbound::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };

            if sender.send(message).await.is_err() {
                debug!("WebSocket send failed, client disconnected");
                break;
            }
        }
    });

    // Forward client frames to the session; dropping the sender tells the
    // session the client is gone
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let inbound = match msg {
                Message::Pong(_) => Inbound::Pong,
                Message::Text(text) => Inbound::Text(text),
                Message::Close(_) => Inbound::Close,
                Message::Ping(_) | Message::Binary(_) => continue,
            };

            let closing = inbound == Inbound::Close;
            if inbound_tx.send(inbound).await.is_err() || closing {
                break;
            }
        }
    });

    match session_task.await {
        Ok(summary) => info!(
            "live telemetry client disconnected: {:?} ({} frames, {} subscriptions)",
            summary.reason, summary.stats_sent, summary.subscriptions_opened
        ),
        Err(e) => warn!("gateway session task failed: {}", e),
    }

    recv_task.abort();
    if let Err(e) = send_task.await {
        debug!("send task ended: {}", e);
    }
}
