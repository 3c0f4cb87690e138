use std::{net::SocketAddr, sync::Arc, time::Instant};

use {
    axum::extract::ws::{Message, WebSocket},
    futures::{SinkExt, stream::StreamExt},
    graphpush_protocol::{GraphQLError, ResponseFrame, error_codes},
    graphpush_server::{InboundEvent, Transport, encode_frame},
    tracing::{debug, info, warn},
};

use crate::state::GatewayState;

/// Handle a single WebSocket connection through its full lifecycle:
/// register → message loop → cleanup.
///
/// Frames are not handled in order: each one is routed on its own task so a
/// long-running subscription never blocks the next frame on the same socket.
pub async fn handle_connection(socket: WebSocket, state: Arc<GatewayState>, remote_addr: SocketAddr) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let connected_at = Instant::now();
    info!(conn_id = %conn_id, remote_ip = %remote_addr.ip(), "ws: new connection");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut client_rx = state.connections.open(&conn_id);

    // Spawn write loop: forwards pushed frames to the WebSocket.
    let write_conn_id = conn_id.clone();
    let write_handle = tokio::spawn(async move {
        while let Some(msg) = client_rx.recv().await {
            if ws_tx.send(Message::Text(msg.into())).await.is_err() {
                debug!(conn_id = %write_conn_id, "ws: write loop closed");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    // ── Message loop ─────────────────────────────────────────────────────

    while let Some(msg) = ws_rx.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t.to_string(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "ws: read error");
                break;
            },
        };

        // Enforce payload size limit.
        if text.len() > state.max_payload_bytes {
            warn!(conn_id = %conn_id, size = text.len(), "ws: payload too large");
            let frame = ResponseFrame::failure(None, vec![GraphQLError::with_code(
                error_codes::INVALID_REQUEST,
                format!("payload too large (max {} bytes)", state.max_payload_bytes),
            )]);
            let _ = state.connections.send(&conn_id, encode_frame(&frame)).await;
            continue;
        }

        let handler = Arc::clone(&state.handler);
        let event = InboundEvent::frame(conn_id.clone(), text);
        tokio::spawn(async move {
            handler.handle(event).await;
        });
    }

    // ── Cleanup ──────────────────────────────────────────────────────────

    state.connections.close(&conn_id);
    let cancelled = state.handler.disconnect(&conn_id);
    write_handle.abort();

    info!(
        conn_id = %conn_id,
        cancelled,
        duration_secs = connected_at.elapsed().as_secs(),
        "ws: connection closed"
    );
}
