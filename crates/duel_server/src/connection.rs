//! Per-connection WebSocket loops.

use crate::coordinator::Coordinator;
use crate::error::SessionError;
use crate::ids::ConnectionId;
use crate::protocol::{ClientEvent, ServerEvent};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, trace, warn};

/// Drives one WebSocket until either side closes it.
///
/// A writer task drains the connection's outbound queue and sends periodic
/// pings; the reader feeds parsed frames to the coordinator in arrival
/// order. Whichever finishes first ends the connection, and the coordinator
/// then runs disconnect cleanup.
#[instrument(skip_all)]
pub async fn serve_socket(socket: WebSocket, coordinator: Arc<Coordinator>, heartbeat: Duration) {
    let (handle, rx) = coordinator.register();
    info!(connection_id = %handle, "WebSocket client connected");

    let (ws_tx, ws_rx) = socket.split();
    let mut writer = tokio::spawn(write_loop(ws_tx, rx, handle, heartbeat));
    let mut reader = tokio::spawn(read_loop(ws_rx, Arc::clone(&coordinator), handle));

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    coordinator.on_disconnect(handle).await;
    info!(connection_id = %handle, "WebSocket client disconnected");
}

async fn write_loop(
    mut ws_tx: futures::stream::SplitSink<WebSocket, WsMessage>,
    mut rx: mpsc::Receiver<ServerEvent>,
    handle: ConnectionId,
    heartbeat: Duration,
) {
    let mut ping = tokio::time::interval(heartbeat);
    // The first tick fires immediately.
    ping.tick().await;

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(connection_id = %handle, event = event.name(), error = %e, "Failed to serialize event");
                        continue;
                    }
                };
                if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if ws_tx.send(WsMessage::Ping(Default::default())).await.is_err() {
                    break;
                }
                trace!(connection_id = %handle, "Sent ping");
            }
        }
    }
}

async fn read_loop(
    mut ws_rx: futures::stream::SplitStream<WebSocket>,
    coordinator: Arc<Coordinator>,
    handle: ConnectionId,
) {
    while let Some(frame) = ws_rx.next().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(e) => {
                debug!(connection_id = %handle, error = %e, "WebSocket read error");
                break;
            }
        };
        match msg {
            WsMessage::Text(text) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(event) => coordinator.handle(handle, event).await,
                Err(e) => {
                    debug!(connection_id = %handle, error = %e, "Unparseable frame");
                    coordinator.reject(handle, SessionError::MalformedMessage);
                }
            },
            WsMessage::Close(_) => break,
            // Pongs need no bookkeeping and axum answers pings itself.
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
            WsMessage::Binary(_) => coordinator.reject(handle, SessionError::MalformedMessage),
        }
    }
}
