//! WebSocket client protocol
//!
//! One supervisor session (and so one RequestCoordinator) per connection.
//! Text frames are decoded with [`Inbound::from_frame`]; every reply is sent
//! back as one JSON text frame.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::workers::{ClientReply, Inbound};
use crate::AppState;

/// Replies buffered per connection before coordinators wait on the socket
const CLIENT_BUFFER: usize = 32;

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (reply_tx, mut reply_rx) = mpsc::channel::<ClientReply>(CLIENT_BUFFER);
    let session = match state.supervisor.connect(reply_tx).await {
        Ok(session) => session,
        Err(e) => {
            warn!("Rejecting WebSocket connection: {}", e);
            return;
        }
    };
    info!(session = %session.id(), "WebSocket connected");

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(reply) = reply_rx.recv().await {
            let text = match serde_json::to_string(&reply) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to serialize reply: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if let Err(e) = session.send(Inbound::from_frame(&text)).await {
                    warn!(session = %session.id(), "Dropping connection: {}", e);
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(session = %session.id(), "WebSocket receive error: {}", e);
                break;
            }
        }
    }

    info!(session = %session.id(), "WebSocket disconnected");
    session.close().await;
    writer.abort();
}
