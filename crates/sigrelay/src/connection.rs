use crate::context::ConnContext;
use crate::error::SignalError;
use crate::lifecycle;
use crate::metrics::gauges;
use crate::registry::PeerHandle;
use crate::router;
use crate::server::ServerState;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use sigrelay_common::DecodeError;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsRecv = SplitStream<WebSocketStream<TcpStream>>;

/// Counts a connection as active for as long as it is held.
pub(crate) struct ConnGuard {
    state: Arc<ServerState>,
}

impl ConnGuard {
    pub(crate) fn acquire(state: Arc<ServerState>) -> Self {
        state.active_connections.fetch_add(1, Ordering::Relaxed);
        gauges::inc_connections_active();
        Self { state }
    }
}

impl Drop for ConnGuard {
    fn drop(&mut self) {
        self.state.active_connections.fetch_sub(1, Ordering::Relaxed);
        gauges::dec_connections_active();
    }
}

fn forbidden(reason: &str) -> ErrorResponse {
    let mut resp = ErrorResponse::new(Some(reason.to_string()));
    *resp.status_mut() = StatusCode::FORBIDDEN;
    resp
}

/// Drive the select loop for one connection until it closes or the server
/// shuts down.
async fn run_message_loop(
    ws_tx: &mut WsSink,
    ws_rx: &mut WsRecv,
    outbound_rx: &mut mpsc::Receiver<String>,
    shutdown_rx: &mut watch::Receiver<()>,
    state: &ServerState,
    ctx: &mut ConnContext,
) -> Result<(), SignalError> {
    let period = Duration::from_secs(state.config.ping_interval);
    let mut ping_interval = interval(period);
    ping_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ping_interval.tick().await;

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        router::handle_text(&state.registry, ctx, &text);
                    }
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                        Ok(text) => router::handle_text(&state.registry, ctx, &text),
                        Err(_) => router::reject(ctx, &DecodeError::InvalidJson),
                    },
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = ws_tx.send(Message::Pong(data)).await {
                            tracing::debug!("failed to send pong: {}", e);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Err(e)) => return Err(SignalError::WebSocket(e)),
                    _ => {}
                }
            }
            Some(text) = outbound_rx.recv() => {
                ws_tx.send(Message::Text(text)).await.map_err(SignalError::WebSocket)?;
            }
            _ = shutdown_rx.changed() => {
                tracing::debug!(conn = ctx.id(), "server shutting down, closing connection");
                if let Err(e) = ws_tx.send(Message::Close(None)).await {
                    tracing::debug!("failed to send close: {}", e);
                }
                return Ok(());
            }
            _ = ping_interval.tick() => {
                if let Err(e) = ws_tx.send(Message::Ping(Vec::new())).await {
                    tracing::debug!("failed to send ping: {}", e);
                }
            }
        }
    }
}

/// Serve one accepted TCP connection: upgrade, relay, then release its slot.
///
/// A shutdown signal on `shutdown_rx` closes the connection through the same
/// release path as a client-initiated close.
///
/// # Errors
///
/// Returns an error if the WebSocket handshake fails or the transport breaks.
/// The session cleanup runs either way.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<ServerState>,
    mut shutdown_rx: watch::Receiver<()>,
    _guard: ConnGuard,
) -> Result<(), SignalError> {
    let ws_config = WebSocketConfig {
        max_message_size: Some(state.config.max_message_size),
        max_frame_size: Some(state.config.max_message_size),
        ..WebSocketConfig::default()
    };

    let handshake_state = Arc::clone(&state);
    let ws_stream = tokio_tungstenite::accept_hdr_async_with_config(
        stream,
        move |req: &Request, resp: Response| {
            let origin = req
                .headers()
                .get("origin")
                .and_then(|v| v.to_str().ok());
            if handshake_state.config.origin_permitted(origin) {
                Ok(resp)
            } else {
                tracing::debug!(origin = origin.unwrap_or_default(), "refusing cross-origin upgrade");
                Err(forbidden("origin not allowed"))
            }
        },
        Some(ws_config),
    )
    .await
    .map_err(SignalError::WebSocket)?;

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(state.config.outbound_queue);
    let mut ctx = ConnContext::new(PeerHandle::new(state.next_conn_id(), outbound_tx));
    tracing::debug!(conn = ctx.id(), %peer_addr, "connection opened");

    let result = run_message_loop(
        &mut ws_tx,
        &mut ws_rx,
        &mut outbound_rx,
        &mut shutdown_rx,
        &state,
        &mut ctx,
    )
    .await;

    // Close the queue first so peers routing to us see the handle as closed.
    drop(outbound_rx);
    if let Err(e) = &result {
        lifecycle::on_transport_error(&ctx, e);
    }
    lifecycle::on_close(&state.registry, &ctx);
    tracing::debug!(conn = ctx.id(), %peer_addr, "connection closed");

    result
}
