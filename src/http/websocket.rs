//! WebSocket endpoint for push clients.
//!
//! # Responsibilities
//! - Complete the upgrade handshake
//! - Require a registration frame within the registration timeout
//! - Relay client frames (subscribe / heartbeat / disconnect) to the distributor
//! - Drain the connection's outbound queue onto the socket
//!
//! # Data Flow
//! ```text
//! client frame ──→ ClientMessage ──→ PushDistributor (subscribe, heartbeat)
//!                                        │
//! socket ←── ServerMessage ←── outbound queue (publish fan-out, admin push)
//! ```
//!
//! # Design Decisions
//! - One task per socket selecting over socket reads and the outbound queue
//! - The registry owns the only queue sender; when the connection is removed
//!   (expiry, admin disconnect, shutdown) the queue closes and the socket
//!   closes after flushing what was already queued

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use chrono::Utc;
use tokio::time;

use crate::center::ConfigCenter;
use crate::http::server::AppState;
use crate::push::{ClientMessage, ConnectionId, Registration, ServerMessage};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.center))
}

enum Flow {
    Continue,
    Stop,
}

async fn send(socket: &mut WebSocket, message: &ServerMessage) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize server message");
            return Ok(());
        }
    };
    socket.send(Message::Text(text.into())).await
}

async fn reject(mut socket: WebSocket, message: String) {
    let _ = send(&mut socket, &ServerMessage::Error { message }).await;
    let _ = socket.send(Message::Close(None)).await;
}

/// Wait for the first text frame and parse it.
async fn first_message(socket: &mut WebSocket) -> Option<Result<ClientMessage, serde_json::Error>> {
    while let Some(Ok(frame)) = socket.recv().await {
        match frame {
            Message::Text(text) => return Some(serde_json::from_str(text.as_str())),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
    None
}

async fn handle_socket(mut socket: WebSocket, center: ConfigCenter) {
    let policy = center.push().policy();

    let registration = match time::timeout(policy.registration_timeout(), first_message(&mut socket)).await {
        Ok(Some(Ok(ClientMessage::ClientRegistration {
            application_id,
            instance_id,
            instance_ip,
            client_version,
        }))) => Registration {
            application_id,
            instance_id,
            instance_ip,
            client_version,
        },
        Ok(Some(Ok(_))) => return reject(socket, "first message must be CLIENT_REGISTRATION".into()).await,
        Ok(Some(Err(e))) => return reject(socket, format!("malformed message: {e}")).await,
        Ok(None) => return,
        Err(_) => {
            tracing::debug!("Socket closed: no registration within timeout");
            return reject(socket, "registration timeout".into()).await;
        }
    };

    if let Err(e) = center.catalog().get_application(&registration.application_id) {
        return reject(socket, e.to_string()).await;
    }

    let mut session = match center.push().register(registration) {
        Ok(session) => session,
        Err(e) => return reject(socket, e.to_string()).await,
    };
    let id = session.connection_id;

    let welcome = ServerMessage::ConnectSuccess {
        connection_id: id.to_string(),
        heartbeat_interval_secs: policy.heartbeat_interval_secs,
        server_time: Utc::now(),
    };
    if send(&mut socket, &welcome).await.is_err() {
        let _ = center.push().disconnect(id);
        return;
    }

    loop {
        tokio::select! {
            outgoing = session.outbound.recv() => match outgoing {
                Some(message) => {
                    if send(&mut socket, &message).await.is_err() {
                        break;
                    }
                }
                None => {
                    tracing::debug!(connection_id = %id, "Outbound queue closed by registry");
                    break;
                }
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Flow::Stop = handle_frame(&center, &mut socket, id, text.as_str()).await {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(connection_id = %id, error = %e, "Socket read failed");
                    break;
                }
            },
        }
    }

    // Already gone if the registry initiated the close.
    let _ = center.push().disconnect(id);
    let _ = socket.send(Message::Close(None)).await;
}

async fn handle_frame(center: &ConfigCenter, socket: &mut WebSocket, id: ConnectionId, text: &str) -> Flow {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            let _ = send(socket, &ServerMessage::Error { message: format!("malformed message: {e}") }).await;
            return Flow::Continue;
        }
    };

    let reply = match message {
        ClientMessage::Subscribe { topic } => match center.push().subscribe(id, &topic) {
            Ok(topic) => ServerMessage::Subscribed { topic: topic.to_string() },
            Err(e) => ServerMessage::Error { message: e.to_string() },
        },
        ClientMessage::Heartbeat => match center.push().heartbeat(id) {
            Ok(()) => ServerMessage::HeartbeatAck { server_time: Utc::now() },
            // Expired between frames; the client must reconnect.
            Err(_) => return Flow::Stop,
        },
        ClientMessage::Disconnect => {
            tracing::debug!(connection_id = %id, "Client requested disconnect");
            return Flow::Stop;
        }
        ClientMessage::ClientRegistration { .. } => ServerMessage::Error {
            message: format!("already registered as {id}"),
        },
    };

    if send(socket, &reply).await.is_err() {
        return Flow::Stop;
    }
    Flow::Continue
}
