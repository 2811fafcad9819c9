//! WebSocket lifecycle for one client, from upgrade through teardown.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use hermes_core::{ConnectionId, DeliveryError};
use hermes_session::Session;
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::{ClientConnection, OutboundFrame};
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::config::ServerConfig;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL, WS_HEARTBEAT_TIMEOUTS_TOTAL, WS_INBOUND_FRAMES_TOTAL,
};
use crate::server::SessionDeps;

/// Serve one upgraded socket until the client leaves, the heartbeat gives
/// up, or `cancel` fires.
///
/// 1. Build the session with fresh store and bus clients
/// 2. Feed text (and UTF-8 binary) frames to the session in order
/// 3. Write outbound frames and pings from a dedicated writer task
/// 4. On exit, close the session exactly once, then stop the writer
#[instrument(skip_all, fields(connection_id = %connection_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    connection_id: ConnectionId,
    config: ServerConfig,
    deps: SessionDeps,
    cancel: CancellationToken,
) {
    let started = Instant::now();
    let (ws_tx, mut ws_rx) = ws.split();
    let (out_tx, out_rx) = mpsc::channel::<OutboundFrame>(config.outbound_queue);
    let connection = Arc::new(ClientConnection::new(connection_id.clone(), out_tx));

    let writer = tokio::spawn(write_frames(ws_tx, out_rx, config.clone(), cancel.clone()));
    let mut heartbeat = tokio::spawn(run_heartbeat(
        connection.clone(),
        config.heartbeat_interval,
        config.heartbeat_timeout,
        cancel.clone(),
    ));

    let mut session = Session::new(
        connection_id.clone(),
        deps.verifier.clone(),
        Arc::new(deps.store.client()),
        Arc::new(deps.bus.client()),
        connection.clone(),
    );

    info!(connection_id = %connection_id, "connection established");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    loop {
        tokio::select! {
            frame = ws_rx.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
                    // invalid UTF-8 becomes replacement characters and fails to decode
                    Some(Ok(Message::Binary(data))) => String::from_utf8_lossy(&data).into_owned(),
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        connection.mark_alive();
                        continue;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(connection_id = %connection_id, "client closed connection");
                        break;
                    }
                    Some(Err(err)) => {
                        session.on_error(&err);
                        break;
                    }
                };
                connection.mark_alive();
                counter!(WS_INBOUND_FRAMES_TOTAL).increment(1);
                session.handle_inbound(&text).await;
            }
            result = &mut heartbeat => {
                match result {
                    Ok(HeartbeatResult::TimedOut) => {
                        warn!(
                            connection_id = %connection_id,
                            timeout = ?config.heartbeat_timeout,
                            "client unresponsive, disconnecting"
                        );
                        counter!(WS_HEARTBEAT_TIMEOUTS_TOTAL).increment(1);
                    }
                    Ok(HeartbeatResult::Cancelled) | Err(_) => {
                        debug!(connection_id = %connection_id, "connection cancelled");
                    }
                }
                break;
            }
        }
    }

    session.close().await;
    cancel.cancel();
    heartbeat.abort();
    let _ = writer.await;

    info!(connection_id = %connection_id, "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}

/// Drain queued frames to the socket, acknowledging each, and ping on the
/// heartbeat interval. Sends a close frame when cancelled.
async fn write_frames(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut out_rx: mpsc::Receiver<OutboundFrame>,
    config: ServerConfig,
    cancel: CancellationToken,
) {
    let mut ping_interval = tokio::time::interval(config.heartbeat_interval);
    let _ = ping_interval.tick().await;

    loop {
        tokio::select! {
            frame = out_rx.recv() => {
                let Some(mut frame) = frame else { break };
                let text = std::mem::take(&mut frame.text);
                let result = ws_tx
                    .send(Message::Text(text.into()))
                    .await
                    .map_err(|e| DeliveryError::Transport(e.to_string()));
                let failed = result.is_err();
                frame.complete(result);
                if failed {
                    break;
                }
            }
            _ = ping_interval.tick() => {
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            () = cancel.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
        }
    }
    // frames still queued are failed by dropping their acks
    out_rx.close();
}
