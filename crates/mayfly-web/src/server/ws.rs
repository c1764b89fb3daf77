//! WebSocket — stream room snapshots to subscribed clients.

use std::sync::Arc;

use axum::{
    extract::{ws::WebSocket, Path, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::StreamExt;
use tracing::{error, info};

use mayfly_core::store::MessageStore;

use super::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/ws/{code}", get(ws_handler))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(code): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, code, state))
}

/// Forward the room's snapshots for as long as the client listens. The
/// store sends the current snapshot immediately, then one per change.
async fn handle_socket(mut socket: WebSocket, code: String, state: Arc<AppState>) {
    let mut snapshots = match state.store.subscribe(&code).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("subscribe failed for room {}: {}", code, e);
            drop(socket);
            return;
        }
    };

    info!("WebSocket client connected to room {}", code);

    loop {
        tokio::select! {
            // Snapshots from the store -> send to client
            snapshot = snapshots.next() => {
                match snapshot {
                    Some(snapshot) => {
                        match serde_json::to_string(&snapshot) {
                            Ok(json) => {
                                if socket.send(axum::extract::ws::Message::Text(json.into())).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                error!("Failed to serialize snapshot: {}", e);
                            }
                        }
                    }
                    // Room swept; the stream is over
                    None => break,
                }
            }
            // Incoming messages from client (keep-alive)
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {} // keep-alive, ignore content
                    _ => break,       // disconnected or error
                }
            }
        }
    }

    info!("WebSocket client disconnected from room {}", code);
}
