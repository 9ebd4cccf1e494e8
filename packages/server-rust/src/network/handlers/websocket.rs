//! WebSocket upgrade and the per-connection supervisor.
//!
//! Each connection runs two duties on one task:
//!
//! - **inbound** reads client frames and feeds them to the relay, queueing
//!   error replies for refused frames
//! - **outbound** drains the session's queue into the socket; it is the
//!   only writer
//!
//! Whichever duty ends first ends the connection; the other is dropped at
//! its current await point and the session is released from the relay.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use gabriel_core::{ClientIdentity, ToClient};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::AppState;
use crate::relay::{ClientSession, FrameOutcome, OutboundMessage, Relay, SendError, SessionGuard};

/// Upgrades a client connection, or answers 503 while not accepting.
pub async fn ws_upgrade_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    if !state.shutdown.is_accepting() {
        debug!(%addr, "Refusing upgrade: gateway not accepting connections");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let conn = &state.config.connection;
    let mut ws = ws
        .write_buffer_size(conn.ws_write_buffer_size)
        .max_write_buffer_size(conn.ws_max_write_buffer_size);
    if let Some(limit) = conn.max_message_size {
        ws = ws.max_message_size(limit).max_frame_size(limit);
    }

    let identity = ClientIdentity::from(addr);
    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, identity: ClientIdentity) {
    let _connection = state.shutdown.connection_guard();

    let (session, outbound_rx) = match state.relay.connect(identity) {
        Ok(pair) => pair,
        Err(err) => {
            warn!(%identity, error = %err, "Closing connection");
            let frame = CloseFrame {
                code: close_code::POLICY,
                reason: "identity already connected".into(),
            };
            let _ = socket.send(Message::Close(Some(frame))).await;
            return;
        }
    };
    let _session = SessionGuard::new(Arc::clone(&state.relay), Arc::clone(&session));

    let (sink, stream) = socket.split();
    let send_timeout = state.config.connection.send_timeout;

    tokio::select! {
        () = run_inbound(stream, &state.relay, &session, send_timeout) => {
            debug!(%identity, "Inbound duty finished");
        }
        () = run_outbound(sink, outbound_rx) => {
            debug!(%identity, "Outbound duty finished");
        }
    }
    info!(%identity, "Connection closed");
}

async fn run_inbound(
    mut stream: SplitStream<WebSocket>,
    relay: &Relay,
    session: &ClientSession,
    send_timeout: Duration,
) {
    let identity = session.identity();

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Binary(bytes)) => {
                let FrameOutcome::Rejected(reply) = relay.handle_frame(session, &bytes).await
                else {
                    continue;
                };
                match session
                    .send_message(&ToClient::Result(reply), send_timeout)
                    .await
                {
                    Ok(()) => {}
                    Err(SendError::Disconnected) => break,
                    Err(err) => warn!(%identity, error = ?err, "Dropping error reply"),
                }
            }
            Ok(Message::Text(_)) => {
                warn!(%identity, "Ignoring text frame; the protocol is binary");
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(err) => {
                debug!(%identity, error = %err, "WebSocket read failed");
                break;
            }
        }
    }
}

async fn run_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<OutboundMessage>,
) {
    while let Some(msg) = rx.recv().await {
        match msg {
            OutboundMessage::Binary(bytes) => {
                if sink.send(Message::Binary(bytes.into())).await.is_err() {
                    break;
                }
            }
            OutboundMessage::Close(reason) => {
                let _ = sink.send(Message::Close(Some(away(reason)))).await;
                break;
            }
        }
    }
}

fn away(reason: Option<String>) -> CloseFrame {
    CloseFrame {
        code: close_code::AWAY,
        reason: reason.unwrap_or_default().into(),
    }
}
