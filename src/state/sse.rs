use tokio::sync::broadcast;

use crate::dto::sse::ServerEvent;

/// Broadcast hub fanning lobby events out to every SSE subscriber.
///
/// Events carry their lobby channel so subscribers can filter on a single lobby.
#[derive(Clone)]
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, returning how many received it.
    ///
    /// Having no subscriber is not an error.
    pub fn broadcast(&self, event: ServerEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}
