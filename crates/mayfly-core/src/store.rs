//! Message stores — the append-only log a session is keyed to.
//!
//! Two implementations: `MemoryStore` keeps rooms in-process (tests, the
//! loopback client, and the relay server's backend) and `RelayStore` talks
//! to a remote relay over HTTP + WebSocket. Subscribers always receive the
//! whole room snapshot, never deltas, so redelivery and lag are harmless.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::warn;

use crate::types::ParticipantId;

/// Snapshot channel depth per room. Receivers that fall behind skip
/// straight to a newer full snapshot.
const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;

// ── Wire types ──

/// What a client submits. The id is minted client-side so the sender can
/// recognize its own message when it comes back in a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub id: String,
    pub author: ParticipantId,
    pub text: String,
}

/// What the store hands back: the submitted message plus the server-assigned
/// timestamp and per-room sequence number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub author: ParticipantId,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub seq: u64,
}

pub type Snapshot = Vec<StoredMessage>;

/// Sort into canonical order: timestamp, then sequence number. Stable, so
/// entries that compare equal keep arrival order.
pub fn canonical_order(messages: &mut [StoredMessage]) {
    messages.sort_by_key(|m| (m.timestamp, m.seq));
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Transport(String),
    #[error("store returned malformed data: {0}")]
    Malformed(String),
}

/// The log boundary the session engine writes to and watches.
#[async_trait]
pub trait MessageStore: Send + Sync + 'static {
    /// Append one message to a room's log. Returns the message id.
    async fn append(&self, code: &str, msg: NewMessage) -> Result<String, StoreError>;

    /// Watch a room. Yields the full ordered snapshot once immediately and
    /// again after every change. Unknown codes start an empty room. The
    /// stream ends only when the room is gone or the connection is lost.
    async fn subscribe(&self, code: &str) -> Result<BoxStream<'static, Snapshot>, StoreError>;
}

// ── In-process store ──

struct Room {
    messages: Vec<StoredMessage>,
    next_seq: u64,
    notify: broadcast::Sender<Snapshot>,
    touched: Instant,
}

impl Room {
    fn new() -> Self {
        let (notify, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        Self {
            messages: Vec::new(),
            next_seq: 0,
            notify,
            touched: Instant::now(),
        }
    }
}

/// Rooms in a mutex-guarded map, one snapshot broadcast per room.
pub struct MemoryStore {
    rooms: Mutex<HashMap<String, Room>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// One-shot ordered snapshot. Unknown rooms read as empty.
    pub async fn snapshot(&self, code: &str) -> Snapshot {
        let rooms = self.rooms.lock().await;
        rooms.get(code).map(|r| r.messages.clone()).unwrap_or_default()
    }

    /// Drop rooms untouched for `max_idle`. Dropping a room closes its
    /// subscribers' streams. Returns how many rooms went.
    pub async fn sweep_idle(&self, max_idle: Duration) -> usize {
        let mut rooms = self.rooms.lock().await;
        let before = rooms.len();
        rooms.retain(|_, room| room.touched.elapsed() < max_idle);
        before - rooms.len()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append(&self, code: &str, msg: NewMessage) -> Result<String, StoreError> {
        let mut rooms = self.rooms.lock().await;
        let room = rooms.entry(code.to_string()).or_insert_with(Room::new);
        let stored = StoredMessage {
            id: msg.id.clone(),
            author: msg.author,
            text: msg.text,
            timestamp: Utc::now(),
            seq: room.next_seq,
        };
        room.next_seq += 1;
        room.messages.push(stored);
        room.touched = Instant::now();
        let _ = room.notify.send(room.messages.clone());
        Ok(msg.id)
    }

    async fn subscribe(&self, code: &str) -> Result<BoxStream<'static, Snapshot>, StoreError> {
        let (initial, rx) = {
            let mut rooms = self.rooms.lock().await;
            let room = rooms.entry(code.to_string()).or_insert_with(Room::new);
            room.touched = Instant::now();
            (room.messages.clone(), room.notify.subscribe())
        };

        let stream = futures::stream::unfold((Some(initial), rx), |(pending, mut rx)| async move {
            if let Some(snapshot) = pending {
                return Some((snapshot, (None, rx)));
            }
            loop {
                match rx.recv().await {
                    Ok(snapshot) => return Some((snapshot, (None, rx))),
                    // Snapshots are whole; after lag the next one catches us up.
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(stream.boxed())
    }
}

// ── Relay-backed store ──

/// Store speaking to a mayfly-web relay: append over HTTP, snapshots over
/// WebSocket.
pub struct RelayStore {
    base_url: String,
    client: reqwest::Client,
}

impl RelayStore {
    /// `base_url` is the relay's HTTP root, e.g. `http://127.0.0.1:8787`.
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn ws_url(&self, code: &str) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            format!("ws://{}", self.base_url)
        };
        format!("{}/ws/{}", ws_base, code)
    }
}

#[async_trait]
impl MessageStore for RelayStore {
    async fn append(&self, code: &str, msg: NewMessage) -> Result<String, StoreError> {
        let url = format!("{}/api/rooms/{}/messages", self.base_url, code);
        let response = self
            .client
            .post(&url)
            .json(&msg)
            .send()
            .await
            .map_err(|e| StoreError::Transport(format!("append failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Transport(format!("append HTTP {status}")));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| StoreError::Malformed(format!("append response: {e}")))?;
        data.get("id")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| StoreError::Malformed("append response missing id".into()))
    }

    async fn subscribe(&self, code: &str) -> Result<BoxStream<'static, Snapshot>, StoreError> {
        let url = self.ws_url(code);
        let (ws, _) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| StoreError::Transport(format!("websocket connect failed: {e}")))?;
        let (_write, read) = ws.split();

        let stream = read
            .filter_map(|msg| async move {
                match msg {
                    Ok(WsMessage::Text(text)) => {
                        match serde_json::from_str::<Snapshot>(&text) {
                            Ok(mut snapshot) => {
                                canonical_order(&mut snapshot);
                                Some(snapshot)
                            }
                            Err(e) => {
                                warn!("dropping malformed relay snapshot: {}", e);
                                None
                            }
                        }
                    }
                    Ok(_) => None,
                    Err(e) => {
                        warn!("relay websocket error: {}", e);
                        None
                    }
                }
            })
            .boxed();

        Ok(stream)
    }
}
