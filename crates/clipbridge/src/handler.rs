//! Per-connection handler: message routing and room membership.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The task multiplexes two sources:
//!   1. Messages from the device → create/join/clipboard/leave/status
//!   2. Payloads relayed by the room → `sync` messages to the device
//!
//! When the room drops this connection (slow consumer, room closed) the
//! relayed channel ends and the connection is closed.

use std::sync::Arc;
use std::time::Instant;

use clipbridge_protocol::{ClientMessage, Codec, RoomCode, ServerMessage};
use clipbridge_room::{Delivery, RoomError};
use clipbridge_transport::{
    Connection, ConnectionId, TransportError, WebSocketConnection,
};
use tokio::sync::mpsc;

use crate::ClipbridgeError;
use crate::server::ServerState;

/// Drop guard that leaves the current room when the handler exits.
///
/// This ensures the room forgets the device even if the handler returns
/// early with an error. Since `Drop` is synchronous, we spawn a
/// fire-and-forget task for the async leave.
struct Membership<C: Codec> {
    conn_id: ConnectionId,
    room: Option<RoomCode>,
    outbound: Option<mpsc::Receiver<Delivery>>,
    state: Arc<ServerState<C>>,
}

impl<C: Codec> Membership<C> {
    /// Forgets the room locally, returning the code to leave.
    fn clear(&mut self) -> Option<RoomCode> {
        self.outbound = None;
        self.room.take()
    }
}

impl<C: Codec> Drop for Membership<C> {
    fn drop(&mut self) {
        let Some(code) = self.clear() else {
            return;
        };
        let conn_id = self.conn_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            if let Err(e) = state.relay.leave(code.as_str(), conn_id).await {
                tracing::debug!(%conn_id, error = %e, "leave on disconnect failed");
            }
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), ClipbridgeError> {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let start = Instant::now();
    let mut membership = Membership {
        conn_id,
        room: None,
        outbound: None,
        state: Arc::clone(&state),
    };
    let mut last_seen = tokio::time::Instant::now();

    loop {
        let idle = tokio::time::sleep_until(last_seen + state.idle_timeout);

        tokio::select! {
            inbound = conn.recv() => {
                let text = match inbound {
                    Ok(Some(text)) => text,
                    Ok(None) => {
                        tracing::info!(%conn_id, "connection closed cleanly");
                        break;
                    }
                    Err(TransportError::InvalidText) => {
                        last_seen = tokio::time::Instant::now();
                        send_error(&conn, &state.codec, 400, "frames must be UTF-8 text").await?;
                        continue;
                    }
                    Err(e) => {
                        tracing::debug!(%conn_id, error = %e, "recv error");
                        break;
                    }
                };
                last_seen = tokio::time::Instant::now();

                let decoded = state
                    .codec
                    .decode::<ClientMessage>(&text)
                    .and_then(|msg| msg.validate().map(|()| msg));
                let msg = match decoded {
                    Ok(msg) => msg,
                    Err(e) => {
                        tracing::debug!(%conn_id, error = %e, "failed to decode message");
                        send_error(&conn, &state.codec, 400, &e.to_string()).await?;
                        continue;
                    }
                };

                let should_close =
                    handle_client_message(&conn, &state, &mut membership, msg, &start).await?;
                if should_close {
                    break;
                }
            }

            delivery = next_delivery(&mut membership.outbound), if membership.outbound.is_some() => {
                match delivery {
                    Some(delivery) => {
                        let msg = ServerMessage::Sync {
                            content: delivery.payload.to_string(),
                        };
                        send_message(&conn, &state.codec, &msg).await?;
                    }
                    None => {
                        // The room already removed us; nothing to leave.
                        let room = membership.clear();
                        tracing::info!(%conn_id, ?room, "dropped by room, closing");
                        break;
                    }
                }
            }

            _ = idle => {
                tracing::info!(%conn_id, "connection timed out");
                break;
            }
        }
    }

    if let Err(e) = conn.close().await {
        tracing::trace!(%conn_id, error = %e, "close after loop failed");
    }

    // membership drops here → leave fires if still joined.
    Ok(())
}

async fn next_delivery(outbound: &mut Option<mpsc::Receiver<Delivery>>) -> Option<Delivery> {
    match outbound {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Handles one decoded client message. Returns `true` if the connection
/// should close.
async fn handle_client_message<C: Codec>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<C>>,
    membership: &mut Membership<C>,
    msg: ClientMessage,
    start: &Instant,
) -> Result<bool, ClipbridgeError> {
    let conn_id = membership.conn_id;

    match msg {
        ClientMessage::CreateRoom => match state.relay.create_room().await {
            Ok(room_code) => {
                send_message(conn, &state.codec, &ServerMessage::RoomCreated { room_code })
                    .await?;
            }
            Err(e) => send_room_error(conn, &state.codec, &e).await?,
        },

        ClientMessage::JoinRoom { room_code } => {
            if let Some(current) = &membership.room {
                let message = format!("already in room {current}; leave it first");
                send_error(conn, &state.codec, 409, &message).await?;
                return Ok(false);
            }

            let (tx, rx) = mpsc::channel(state.relay.config().outbound_queue);
            match state.relay.join_room(&room_code, conn_id, tx).await {
                Ok(info) => {
                    tracing::info!(%conn_id, room = %info.code, devices = info.members, "device joined");
                    membership.room = Some(info.code.clone());
                    membership.outbound = Some(rx);
                    // A replayed snapshot, if any, is already queued on `rx`
                    // and goes out as `sync` right after this reply.
                    let reply = ServerMessage::Joined {
                        room_code: info.code,
                        devices: info.members,
                    };
                    send_message(conn, &state.codec, &reply).await?;
                }
                Err(e) => send_room_error(conn, &state.codec, &e).await?,
            }
        }

        ClientMessage::Clipboard { content } => {
            let Some(code) = membership.room.clone() else {
                send_error(conn, &state.codec, 400, "join a room first").await?;
                return Ok(false);
            };
            match state.relay.send(code.as_str(), conn_id, &content).await {
                Ok(recipients) => {
                    tracing::debug!(%conn_id, room = %code, size = content.len(), recipients, "clipboard relayed");
                }
                Err(e) => {
                    send_room_error(conn, &state.codec, &e).await?;
                    if lost_membership(&e) {
                        let room = membership.clear();
                        tracing::info!(%conn_id, ?room, error = %e, "no longer in room, closing");
                        return Ok(true);
                    }
                }
            }
        }

        ClientMessage::LeaveRoom => {
            if let Some(code) = membership.clear() {
                match state.relay.leave(code.as_str(), conn_id).await {
                    Ok(()) => tracing::info!(%conn_id, room = %code, "device left"),
                    Err(e) => tracing::debug!(%conn_id, error = %e, "leave room failed"),
                }
            }
        }

        ClientMessage::Status => {
            let Some(code) = membership.room.clone() else {
                send_error(conn, &state.codec, 400, "join a room first").await?;
                return Ok(false);
            };
            match state.relay.room_status(code.as_str()).await {
                Ok(info) => {
                    let reply = ServerMessage::Status {
                        idle_secs: info.idle_for().as_secs(),
                        room_code: info.code,
                        devices_connected: info.members,
                        last_content_length: info.last_payload_len,
                    };
                    send_message(conn, &state.codec, &reply).await?;
                }
                Err(e) => {
                    send_room_error(conn, &state.codec, &e).await?;
                    if lost_membership(&e) {
                        membership.clear();
                        tracing::info!(%conn_id, room = %code, "room gone, closing");
                        return Ok(true);
                    }
                }
            }
        }

        ClientMessage::Heartbeat { client_time } => {
            let reply = ServerMessage::HeartbeatAck {
                client_time,
                server_time: start.elapsed().as_millis() as u64,
            };
            send_message(conn, &state.codec, &reply).await?;
        }
    }

    Ok(false)
}

/// `true` if the room no longer counts this connection as a member, either
/// because the room is gone or because it dropped the connection.
fn lost_membership(err: &RoomError) -> bool {
    matches!(err, RoomError::NotFound(_) | RoomError::NotMember(..))
}

/// Wire error code for a room failure.
fn error_code(err: &RoomError) -> u16 {
    match err {
        RoomError::NotFound(_) => 404,
        RoomError::PayloadTooLarge { .. } => 413,
        RoomError::RoomFull(_) | RoomError::AlreadyJoined(..) => 409,
        RoomError::NotMember(..) => 400,
        RoomError::Exhausted { .. } => 500,
    }
}

async fn send_room_error(
    conn: &WebSocketConnection,
    codec: &impl Codec,
    err: &RoomError,
) -> Result<(), ClipbridgeError> {
    send_error(conn, codec, error_code(err), &err.to_string()).await
}

/// Sends a `ServerMessage::Error` to the client.
async fn send_error(
    conn: &WebSocketConnection,
    codec: &impl Codec,
    code: u16,
    message: &str,
) -> Result<(), ClipbridgeError> {
    let msg = ServerMessage::Error {
        code,
        message: message.to_string(),
    };
    send_message(conn, codec, &msg).await
}

async fn send_message(
    conn: &WebSocketConnection,
    codec: &impl Codec,
    msg: &ServerMessage,
) -> Result<(), ClipbridgeError> {
    let text = codec.encode(msg)?;
    conn.send(&text).await?;
    Ok(())
}
