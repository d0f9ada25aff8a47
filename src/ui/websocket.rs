//! Viewer WebSocket sessions
//!
//! One task per viewer: writes frames queued by the hub, feeds inbound text
//! back to it, and pings the socket so a live viewer always answers. The hub
//! drops viewers that stay silent; the session then sees its channel close.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ProtocolError;
use crate::network::AcceptedViewer;
use crate::ui::server::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::debug!("WebSocket upgrade from {}", remote);
    ws.on_upgrade(move |socket| handle_socket(socket, Some(remote), state))
}

async fn handle_socket(mut socket: WebSocket, remote: Option<SocketAddr>, state: Arc<AppState>) {
    let hub = state.engine.hub().clone();
    let AcceptedViewer {
        client_id,
        mut outbound,
    } = hub.accept(remote).await;

    let ping_period = (hub.config().connection_timeout / 2).max(Duration::from_millis(100));
    let mut keepalive = tokio::time::interval(ping_period);
    keepalive.reset();

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if socket.send(Message::Text(frame.to_string())).await.is_err() {
                        tracing::debug!("Write to {} failed", client_id);
                        break;
                    }
                }
                // Hub dropped the viewer (failed send or idle)
                None => break,
            },
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        hub.handle_inbound(&client_id, &text).await;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        tracing::warn!("{} from {}", ProtocolError::UnsupportedFrame, client_id);
                        hub.touch(&client_id);
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => hub.touch(&client_id),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!("Socket error from {}: {}", client_id, e);
                        break;
                    }
                }
            }
            _ = keepalive.tick() => {
                if socket.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    hub.disconnect(&client_id);
    let _ = socket.send(Message::Close(None)).await;
}
