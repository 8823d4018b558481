//! WebSocket upgrade handler

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::battle::{GameWorld, OUTBOUND_BUFFER};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::ServerUpdate;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub player_id: Uuid,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(battle_id): Path<Uuid>,
    Query(query): Query<ConnectQuery>,
    State(state): State<AppState>,
) -> Response {
    info!(battle_id = %battle_id, player_id = %query.player_id, "WebSocket upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, battle_id, query.player_id, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, battle_id: Uuid, player_id: Uuid, state: AppState) {
    let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
    let (world, conn) = state.worlds.attach(battle_id, player_id, tx);

    let (ws_sink, ws_stream) = socket.split();
    let limiter = ConnectionRateLimiter::new(state.config.input_rate_limit);

    // Writer task: world frames -> WebSocket
    let mut writer = tokio::spawn(write_updates(ws_sink, rx, player_id));

    tokio::select! {
        _ = read_payloads(&world, player_id, ws_stream, limiter) => {}
        _ = &mut writer => {
            debug!(player_id = %player_id, "Outbound stream ended");
        }
    }

    world.remove_connection(&conn);
    writer.abort();

    info!(battle_id = %battle_id, player_id = %player_id, "WebSocket connection closed");
}

/// Forward every frame as a text message until the world drops the stream
async fn write_updates(
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<ServerUpdate>,
    player_id: Uuid,
) {
    while let Some(update) = rx.recv().await {
        let Some(text) = update.as_text() else {
            warn!(player_id = %player_id, tick = update.tick, "Frame is not UTF-8, skipping");
            continue;
        };

        if let Err(e) = ws_sink.send(Message::Text(text.to_owned())).await {
            debug!(player_id = %player_id, error = %e, "WebSocket send failed");
            return;
        }
    }

    let _ = ws_sink.close().await;
}

/// Reader loop: WebSocket -> world inbox
async fn read_payloads(
    world: &Arc<GameWorld>,
    player_id: Uuid,
    mut ws_stream: SplitStream<WebSocket>,
    limiter: ConnectionRateLimiter,
) {
    while let Some(result) = ws_stream.next().await {
        let payload = match result {
            Ok(Message::Text(text)) => text.into_bytes(),
            Ok(Message::Binary(bytes)) => bytes,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => {
                debug!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                debug!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        };

        if !limiter.check_input() {
            warn!(player_id = %player_id, "Rate limited input message");
            continue;
        }

        // Bad payloads are logged by the world and otherwise ignored
        if let Ok(queued) = world.accept_payload(player_id, &payload) {
            debug!(player_id = %player_id, queued, "Payload accepted");
        }
    }
}
