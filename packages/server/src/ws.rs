//! WebSocket session transport
//!
//! One socket is one hub session. Inbound text frames are JSON
//! `ClientMessage`s; everything the hub queues for the session is written
//! back as JSON `ServerMessage` text frames by a dedicated writer task.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use kintree_core::sync::SessionId;
use kintree_core::{ClientMessage, FamilyError, SyncHub};
use tracing::{debug, error, info, warn};

use crate::AppState;

async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, state.hub))
}

async fn serve_socket(socket: WebSocket, hub: Arc<SyncHub>) {
    let (session, mut outbound) = hub.open_session().await;
    let (mut sink, mut stream) = socket.split();
    info!("🔌 WebSocket session {} connected", session);

    // Ends once the hub drops the session's sender or the peer goes away
    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    error!("❌ Failed to encode {}: {}", message.event_name(), e);
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(text)).await {
                debug!("Session {} writer stopped: {}", session, e);
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => dispatch(&hub, session, &text).await,
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => dispatch(&hub, session, text).await,
                Err(_) => {
                    hub.reject(session, &FamilyError::protocol("binary frame is not UTF-8"))
                        .await
                }
            },
            Ok(Message::Close(frame)) => {
                info!("🔌 Session {} closed by peer: {:?}", session, frame);
                break;
            }
            // Ping/pong are answered by the websocket layer
            Ok(_) => {}
            Err(e) => {
                warn!("⚠️ Session {} socket error: {}", session, e);
                break;
            }
        }
    }

    hub.close_session(session).await;
    if let Err(e) = writer.await {
        error!("❌ Session {} writer task failed: {}", session, e);
    }
}

async fn dispatch(hub: &SyncHub, session: SessionId, text: &str) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => {
            debug!("📨 Session {} sent {}", session, message.event_name());
            hub.handle(session, message).await;
        }
        Err(e) => {
            warn!("⚠️ Session {} sent an unreadable message: {}", session, e);
            hub.reject(
                session,
                &FamilyError::protocol(format!("unreadable message: {}", e)),
            )
            .await;
        }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(upgrade))
        .with_state(state)
}
