//! Best-effort fan-out of committed lobby changes.

use futures::future::{self, BoxFuture};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::{
    dto::sse::{LobbyEvent, ServerEvent},
    state::SseHub,
};

/// Failure to hand an event to the real-time transport.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("transport rejected event: {0}")]
    Rejected(String),
}

/// Real-time channel receiving lobby events after their transaction committed.
///
/// Failures are reported to the caller, who logs them; they never undo the
/// committed change.
pub trait LobbyNotifier: Send + Sync {
    fn publish(
        &self,
        channel: String,
        event: &'static str,
        payload: LobbyEvent,
    ) -> BoxFuture<'static, Result<(), NotifyError>>;
}

/// Channel name carrying the events of one lobby.
pub fn lobby_channel(lobby_id: Uuid) -> String {
    format!("lobby-{lobby_id}")
}

/// Publishes onto the in-process SSE hub.
pub struct SseNotifier {
    hub: SseHub,
}

impl SseNotifier {
    pub fn new(hub: SseHub) -> Self {
        Self { hub }
    }
}

impl LobbyNotifier for SseNotifier {
    fn publish(
        &self,
        channel: String,
        event: &'static str,
        payload: LobbyEvent,
    ) -> BoxFuture<'static, Result<(), NotifyError>> {
        let result = ServerEvent::json(Some(event.to_string()), &payload)
            .map(|server_event| {
                let receivers = self.hub.broadcast(server_event.on_channel(channel.as_str()));
                debug!(%channel, event, receivers, "published lobby event");
            })
            .map_err(NotifyError::from);
        Box::pin(future::ready(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::LobbyStatus;

    #[tokio::test]
    async fn sse_notifier_tags_events_with_their_channel() {
        let hub = SseHub::new(4);
        let mut receiver = hub.subscribe();
        let notifier = SseNotifier::new(hub);
        let lobby_id = Uuid::new_v4();

        notifier
            .publish(
                lobby_channel(lobby_id),
                "member.joined",
                LobbyEvent {
                    lobby_id,
                    user_id: Uuid::new_v4(),
                    active_count: 2,
                    status: LobbyStatus::Full,
                    occurred_at: "2026-01-01T00:00:00Z".into(),
                },
            )
            .await
            .unwrap();

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.channel, Some(format!("lobby-{lobby_id}")));
        assert_eq!(event.event.as_deref(), Some("member.joined"));
        let data: serde_json::Value = serde_json::from_str(&event.data).unwrap();
        assert_eq!(data["activeCount"], 2);
        assert_eq!(data["status"], "FULL");
    }
}
