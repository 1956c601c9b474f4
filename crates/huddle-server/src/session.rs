//! Per-connection session lifecycle — from upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use huddle_core::frames::{ClientFrame, ServerFrame};
use huddle_core::{ErrorKind, Identity};

use crate::connection::ClientConnection;
use crate::error_channel;
use crate::server::AppState;

/// Lifecycle of one connection. No state is revisited once left.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Transport connection exists, no handshake performed yet.
    Connecting,
    /// The authenticator is being consulted, exactly once.
    Authenticating,
    /// Frames flow: inbound to the router, outbound onto the wire.
    Authenticated,
    /// Terminal. Deregistration has happened (or never applied).
    Closed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Authenticating)
                | (Self::Authenticating, Self::Authenticated)
                | (Self::Authenticating, Self::Closed)
                | (Self::Authenticated, Self::Closed)
        )
    }
}

fn transition(state: &mut SessionState, next: SessionState) {
    debug_assert!(
        state.can_transition_to(next),
        "illegal session transition {state:?} -> {next:?}"
    );
    *state = next;
}

/// Run one WebSocket session to completion.
///
/// 1. Authenticates the handshake credential, exactly once
/// 2. On success: `ready` frame, presence registration, offline catch-up
/// 3. Forwards inbound frames to the router; writer task pushes outbound
///    frames and heartbeat pings
/// 4. On disconnect (or auth failure): tears down and deregisters, once
pub async fn run_session(ws: WebSocket, credential: Option<String>, state: AppState) {
    let (mut ws_tx, ws_rx) = ws.split();
    let mut session_state = SessionState::Connecting;
    transition(&mut session_state, SessionState::Authenticating);

    let identity = match state.authenticator.authenticate(credential.as_deref()).await {
        Ok(identity) => identity,
        Err(err) => {
            warn!(kind = err.kind().as_str(), "authentication failed");
            let rejection = ServerFrame::Error {
                kind: err.kind(),
                detail: err.to_string(),
            };
            if let Ok(json) = serde_json::to_string(&rejection) {
                let _ = ws_tx.send(Message::Text(json.into())).await;
            }
            let _ = ws_tx.close().await;
            transition(&mut session_state, SessionState::Closed);
            return;
        }
    };

    let (send_tx, send_rx) = mpsc::channel::<String>(state.config.max_send_queue);
    let conn = Arc::new(ClientConnection::new(send_tx));
    info!(conn_id = %conn.id, user_id = %identity.user_id, "session authenticated");

    // Ready signal goes out before any routed delivery can race it
    let ready = ServerFrame::Ready {
        user_id: identity.user_id.clone(),
        username: identity.username.clone(),
    };
    match serde_json::to_string(&ready) {
        Ok(json) => {
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                // Client vanished during the handshake; nothing was registered
                transition(&mut session_state, SessionState::Closed);
                return;
            }
        }
        Err(e) => {
            warn!(error = %e, "failed to serialize ready frame");
        }
    }

    transition(&mut session_state, SessionState::Authenticated);
    state.presence.register(&identity, conn.clone());

    let writer = spawn_writer(ws_tx, send_rx, conn.clone(), state.config.clone());

    deliver_backlog(&state, &identity, &conn).await;

    read_loop(ws_rx, &identity, &conn, &state).await;

    // Teardown: whichever of transport disconnect or explicit close got here
    // first wins; deregistration is idempotent either way.
    conn.close();
    writer.abort();
    if let Some(offline) = state.presence.deregister(&conn) {
        state.rooms.leave_all(&offline);
        debug!(user_id = %offline, "identity offline");
    }
    transition(&mut session_state, SessionState::Closed);
    info!(conn_id = %conn.id, user_id = %identity.user_id, "session closed");
}

/// Forward outbound frames onto the wire and ping on the heartbeat interval.
fn spawn_writer(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<String>,
    conn: Arc<ClientConnection>,
    config: Arc<crate::config::ServerConfig>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ping_interval =
            tokio::time::interval(Duration::from_secs(config.heartbeat_interval_secs));
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;
        let pong_timeout = Duration::from_secs(config.heartbeat_timeout_secs);

        loop {
            tokio::select! {
                frame = send_rx.recv() => {
                    match frame {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if !conn.check_alive() && conn.last_pong_elapsed() > pong_timeout {
                        warn!(conn_id = %conn.id, "client unresponsive, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }

        conn.close();
        let _ = ws_tx.close().await;
    })
}

/// Push stored messages that arrived while the identity was offline.
async fn deliver_backlog(state: &AppState, identity: &Identity, conn: &ClientConnection) {
    let backlog = match state.store.fetch_undelivered(&identity.user_id).await {
        Ok(backlog) => backlog,
        Err(e) => {
            warn!(user_id = %identity.user_id, error = %e, "failed to fetch message backlog");
            return;
        }
    };
    if backlog.is_empty() {
        return;
    }

    let mut delivered = Vec::new();
    for message in &backlog {
        if conn.send(&ServerFrame::from_stored(message)) {
            delivered.push(message.id.clone());
        } else {
            // Queue full or connection gone; the rest stays stored
            break;
        }
    }

    info!(
        user_id = %identity.user_id,
        delivered = delivered.len(),
        pending = backlog.len() - delivered.len(),
        "offline catch-up"
    );
    if !delivered.is_empty() {
        if let Err(e) = state.store.mark_delivered(&delivered).await {
            warn!(error = %e, "failed to mark backlog delivered");
        }
    }
}

async fn read_loop(
    mut ws_rx: SplitStream<WebSocket>,
    identity: &Identity,
    conn: &Arc<ClientConnection>,
    state: &AppState,
) {
    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            Message::Text(text) => {
                conn.mark_alive();
                handle_frame(text.as_str(), identity, conn, state).await;
            }
            Message::Binary(data) => {
                conn.mark_alive();
                match std::str::from_utf8(&data) {
                    Ok(text) => handle_frame(text, identity, conn, state).await,
                    Err(_) => {
                        error_channel::notify(
                            conn,
                            ErrorKind::MalformedMessage,
                            "frame is not valid UTF-8",
                        );
                    }
                }
            }
            Message::Close(_) => {
                debug!(conn_id = %conn.id, "client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => conn.mark_alive(),
        }
    }
}

/// Dispatch one inbound frame. Frame-level failures are reported on the error
/// channel and leave the connection open for subsequent valid frames.
#[instrument(skip_all, fields(conn_id = %conn.id, user_id = %identity.user_id))]
async fn handle_frame(
    text: &str,
    identity: &Identity,
    conn: &Arc<ClientConnection>,
    state: &AppState,
) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("unparseable frame");
            error_channel::notify(conn, ErrorKind::MalformedMessage, format!("invalid frame: {e}"));
            return;
        }
    };

    match frame {
        ClientFrame::MessageSend { recipient, payload } => {
            match state.router.route_direct(identity, recipient, payload).await {
                Ok(result) => debug!(
                    message_id = %result.message_id,
                    delivered_to = result.delivered_to,
                    "message routed"
                ),
                Err(err) => {
                    warn!(kind = err.kind().as_str(), "route failed");
                    error_channel::notify(conn, err.kind(), err.to_string());
                }
            }
        }
        ClientFrame::RoomSend { room, payload } => {
            match state.router.route_room(identity, &conn.id, room, payload).await {
                Ok(result) => debug!(
                    message_id = %result.message_id,
                    delivered_to = result.delivered_to,
                    "room message routed"
                ),
                Err(err) => {
                    warn!(kind = err.kind().as_str(), "room route failed");
                    error_channel::notify(conn, err.kind(), err.to_string());
                }
            }
        }
        ClientFrame::RoomJoin { room } => state.rooms.join(room, identity.user_id.clone()),
        ClientFrame::RoomLeave { room } => state.rooms.leave(&room, &identity.user_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connecting_only_advances_to_authenticating() {
        let s = SessionState::Connecting;
        assert!(s.can_transition_to(SessionState::Authenticating));
        assert!(!s.can_transition_to(SessionState::Authenticated));
        assert!(!s.can_transition_to(SessionState::Closed));
        assert!(!s.can_transition_to(SessionState::Connecting));
    }

    #[test]
    fn authenticating_branches_to_authenticated_or_closed() {
        let s = SessionState::Authenticating;
        assert!(s.can_transition_to(SessionState::Authenticated));
        assert!(s.can_transition_to(SessionState::Closed));
        assert!(!s.can_transition_to(SessionState::Connecting));
    }

    #[test]
    fn authenticated_only_closes() {
        let s = SessionState::Authenticated;
        assert!(s.can_transition_to(SessionState::Closed));
        assert!(!s.can_transition_to(SessionState::Authenticating));
        assert!(!s.can_transition_to(SessionState::Connecting));
    }

    #[test]
    fn closed_is_terminal() {
        let s = SessionState::Closed;
        assert!(!s.can_transition_to(SessionState::Connecting));
        assert!(!s.can_transition_to(SessionState::Authenticating));
        assert!(!s.can_transition_to(SessionState::Authenticated));
        assert!(!s.can_transition_to(SessionState::Closed));
    }

    #[test]
    fn transition_helper_advances() {
        let mut s = SessionState::Connecting;
        transition(&mut s, SessionState::Authenticating);
        assert_eq!(s, SessionState::Authenticating);
        transition(&mut s, SessionState::Authenticated);
        transition(&mut s, SessionState::Closed);
        assert_eq!(s, SessionState::Closed);
    }
}
