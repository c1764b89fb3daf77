//! REST endpoints — append to a room, read it back, health.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use mayfly_core::store::{MessageStore, NewMessage};

use super::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/rooms/{code}/messages",
            get(room_snapshot).post(append_message),
        )
        .route("/api/health", get(health))
}

#[derive(Deserialize)]
struct SnapshotQuery {
    /// Return only the last N messages.
    limit: Option<usize>,
}

/// Append one message. The client minted the id; we assign timestamp + seq.
async fn append_message(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(msg): Json<NewMessage>,
) -> impl IntoResponse {
    debug!("room {}: append from {}", code, msg.author);
    match state.store.append(&code, msg).await {
        Ok(id) => (StatusCode::OK, Json(json!({"id": id}))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        ),
    }
}

/// One-shot ordered snapshot of a room. Unknown codes read as empty.
async fn room_snapshot(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Query(q): Query<SnapshotQuery>,
) -> Json<Value> {
    let snapshot = state.store.snapshot(&code).await;
    let start = q
        .limit
        .map_or(0, |limit| snapshot.len().saturating_sub(limit));
    Json(json!(&snapshot[start..]))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({"ok": true, "rooms": state.store.room_count().await}))
}
