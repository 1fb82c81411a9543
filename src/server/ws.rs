// src/server/ws.rs
// Dashboard WebSocket: forwards live pipeline updates to connected clients

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info};

use crate::state::AppState;

pub async fn handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut updates = BroadcastStream::new(state.live.subscribe());
    let (mut sender, mut receiver) = socket.split();
    info!("Dashboard client connected");

    loop {
        tokio::select! {
            update = updates.next() => match update {
                Some(Ok(update)) => {
                    let frame = match serde_json::to_string(&update) {
                        Ok(frame) => frame,
                        Err(e) => {
                            debug!("Failed to serialize live update: {e}");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                // Slow clients skip frames rather than stalling the hub
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    debug!(skipped, "Dashboard client lagged; dropping frames");
                }
                None => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(_)) => break,
                // Clients have nothing to say to us; pings are answered by axum
                Some(Ok(_)) => {}
            },
        }
    }

    info!("Dashboard client disconnected");
}
