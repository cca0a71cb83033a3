//! WebSocket listener shared by both populations.
//!
//! Each accepted socket gets one task. The task registers the connection,
//! reads frames until the transport closes and forwards each one to the
//! opposite population. A spawned writer half drains the connection's
//! outbound queue into the socket and closes it on the way out.

use axum::{
    Router,
    extract::{
        ConnectInfo, State,
        ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::RelayState;
use crate::connection::{ConnectionHandle, ConnectionState, Population};
use crate::registry::Registration;

#[derive(Clone)]
struct ListenerState {
    relay: RelayState,
    population: Population,
}

/// Router for one population's endpoint. Upgrades on any path.
pub fn listener_routes(relay: RelayState, population: Population) -> Router {
    Router::new()
        .fallback(websocket_handler)
        .with_state(ListenerState { relay, population })
}

async fn websocket_handler(
    State(listener): State<ListenerState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, listener.population, listener.relay, peer))
}

/// Run one connection from registration to removal.
pub async fn handle_socket(
    socket: WebSocket,
    population: Population,
    relay: RelayState,
    peer: SocketAddr,
) {
    let registry = relay.registry(population).clone();
    let (handle, mut outbound_rx) =
        ConnectionHandle::new(population, relay.config.outbound_buffer);
    let conn_id = handle.id();

    let registration = Registration::new(registry.clone(), handle);
    relay.metrics.connection_opened(population);
    info!(
        population = %population,
        conn_id = %conn_id,
        %peer,
        clients = registry.size(),
        "connection opened"
    );

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Cancelled when the reader is done; the writer then closes the sink,
    // which flushes any pending close reply to the peer.
    let stop_writer = CancellationToken::new();
    let writer_stop = stop_writer.clone();
    let mut writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_stop.cancelled() => break,
                payload = outbound_rx.recv() => match payload {
                    Some(payload) => ws_sender.send(Message::Text(payload)).await?,
                    None => break,
                },
            }
        }
        ws_sender.close().await
    });

    let mut writer_done = false;
    loop {
        tokio::select! {
            result = &mut writer => {
                writer_done = true;
                match result {
                    Ok(Err(e)) => {
                        relay.metrics.transport_error(population);
                        warn!(population = %population, conn_id = %conn_id, "send failed: {}", e);
                    }
                    Err(e) if e.is_panic() => {
                        warn!(population = %population, conn_id = %conn_id, "writer panicked");
                    }
                    _ => {}
                }
                break;
            }
            frame = ws_receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    forward(&relay, population, text).await;
                }
                Some(Ok(Message::Binary(bytes))) => {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    forward(&relay, population, text.into()).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    relay.metrics.transport_error(population);
                    warn!(population = %population, conn_id = %conn_id, "transport error: {}", e);
                    break;
                }
            }
        }
    }

    registration.handle().transition(ConnectionState::Closing);
    stop_writer.cancel();
    if !writer_done
        && tokio::time::timeout(relay.config.send_timeout, &mut writer)
            .await
            .is_err()
    {
        debug!(population = %population, conn_id = %conn_id, "writer did not finish, aborting");
        writer.abort();
    }
    drop(registration);
    relay.metrics.connection_closed(population);
    info!(
        population = %population,
        conn_id = %conn_id,
        clients = registry.size(),
        "connection closed"
    );
}

/// Forward one inbound payload to the opposite population.
async fn forward(relay: &RelayState, from: Population, payload: Utf8Bytes) {
    relay.metrics.message_received(from);
    debug!(from = %from, payload = %payload.as_str(), "received");

    let to = from.peer();
    let report = relay.broadcast(to, &payload).await;

    info!(
        from = %from,
        to = %to,
        bytes = payload.as_str().len(),
        delivered = report.delivered,
        skipped = report.skipped,
        timed_out = report.timed_out,
        td = relay.producers.size(),
        browser = relay.consumers.size(),
        "relayed message"
    );
}
