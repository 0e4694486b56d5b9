use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::LobbyStatus;

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    /// Channel the event belongs to (`lobby-{id}`), `None` for stream-wide events.
    pub channel: Option<String>,
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Build a stream-wide event from an already encoded payload.
    pub fn new(event: Option<String>, data: String) -> Self {
        Self {
            channel: None,
            event,
            data,
        }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self::new(event.into(), serde_json::to_string(payload)?))
    }

    /// Scope the event to a single channel.
    pub fn on_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the SSE stream (`lobbies` or `lobby-{id}`).
    pub stream: String,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Payload of `member.joined`, `member.left`, `member.kicked` and `lobby.updated`.
pub struct LobbyEvent {
    pub lobby_id: Uuid,
    /// User who joined, left or was kicked; the leader for `lobby.updated`.
    pub user_id: Uuid,
    pub active_count: usize,
    pub status: LobbyStatus,
    /// RFC 3339 timestamp of the committed change.
    pub occurred_at: String,
}
