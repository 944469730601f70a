//! WebSocket upgrade streaming a live chat list.

use std::sync::atomic::Ordering;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::watch::watch_chats;
use crate::web::config::MAX_WS_CONNECTIONS;
use crate::web::state::SharedState;
use crate::web::utils::{api_error, viewer};

#[derive(Deserialize)]
pub struct WsQuery {
    /// Browsers cannot set headers on an upgrade, so the viewer may come here.
    user_id: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
) -> Response {
    let me = match query.user_id.filter(|id| !id.trim().is_empty()) {
        Some(id) => id,
        None => match viewer(&headers) {
            Ok(id) => id,
            Err(resp) => return resp,
        },
    };

    let current = state.ws_connection_count.load(Ordering::Relaxed);
    if current >= MAX_WS_CONNECTIONS {
        return api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            format!(
                "too many WebSocket connections (max {})",
                MAX_WS_CONNECTIONS
            ),
        );
    }

    ws.on_upgrade(move |socket| ws_connection(socket, state, me))
        .into_response()
}

async fn ws_connection(mut socket: WebSocket, state: SharedState, me: String) {
    let ws_count = state.ws_connection_count.clone();
    ws_count.fetch_add(1, Ordering::Relaxed);

    // The subscription lives exactly as long as this connection.
    match watch_chats(state.storage.clone(), me.clone(), state.settle).await {
        Ok(mut subscription) => loop {
            tokio::select! {
                update = subscription.next() => {
                    let Some(update) = update else { break };
                    if let Ok(json) = serde_json::to_string(&update) {
                        if socket.send(WsMessage::Text(json)).await.is_err() {
                            break; // client disconnected
                        }
                    }
                }
                msg = socket.recv() => {
                    match msg {
                        Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => break,
                        Some(Ok(WsMessage::Ping(data))) => {
                            let _ = socket.send(WsMessage::Pong(data)).await;
                        }
                        _ => {}
                    }
                }
            }
        },
        Err(e) => {
            crate::slog!(
                "ws: could not watch chats for {}: {}",
                crate::logging::user_id(&me),
                e
            );
            let body = serde_json::json!({ "type": "error", "error": e.to_string() });
            let _ = socket.send(WsMessage::Text(body.to_string())).await;
        }
    }

    ws_count.fetch_sub(1, Ordering::Relaxed);
}
