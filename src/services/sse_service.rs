use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::sse::{Handshake, ServerEvent, SystemStatus},
    services::notification::lobby_channel,
    state::SharedState,
};

/// Which events a subscriber receives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamScope {
    /// Every lobby event.
    AllLobbies,
    /// Events of one lobby channel, plus stream-wide events.
    Lobby(String),
}

impl StreamScope {
    /// Scope limited to one lobby channel.
    pub fn lobby(lobby_id: Uuid) -> Self {
        StreamScope::Lobby(lobby_channel(lobby_id))
    }

    fn name(&self) -> &str {
        match self {
            StreamScope::AllLobbies => "lobbies",
            StreamScope::Lobby(channel) => channel,
        }
    }

    fn accepts(&self, event: &ServerEvent) -> bool {
        match (self, &event.channel) {
            (_, None) | (StreamScope::AllLobbies, _) => true,
            (StreamScope::Lobby(wanted), Some(channel)) => wanted == channel,
        }
    }
}

/// Subscribe to lobby events and build the greeting sent to the new client.
pub fn subscribe(
    state: &SharedState,
    scope: &StreamScope,
) -> (broadcast::Receiver<ServerEvent>, Option<ServerEvent>) {
    let receiver = state.lobby_sse().subscribe();
    let handshake = ServerEvent::json(
        Some("handshake".to_string()),
        &Handshake {
            stream: scope.name().to_string(),
            message: "subscribed to lobby events".into(),
            degraded: state.is_degraded(),
        },
    )
    .inspect_err(|err| warn!(error = %err, "failed to encode SSE handshake"))
    .ok();
    (receiver, handshake)
}

/// Convert a broadcast receiver into an SSE response, forwarding events that
/// match `scope` and cleaning up once the client disconnects.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ServerEvent>,
    scope: StreamScope,
    greeting: Option<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        if let Some(greeting) = greeting
            && tx.send(Ok(to_event(greeting))).await.is_err()
        {
            return;
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if !scope.accepts(&payload) {
                                continue;
                            }
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(skipped, stream = scope.name(), "SSE subscriber lagged");
                            continue;
                        }
                    }
                }
            }
        }

        info!(stream = scope.name(), "SSE stream disconnected");
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

/// Announce degraded mode transitions to every SSE subscriber.
pub fn spawn_degraded_broadcaster(state: SharedState) -> tokio::task::JoinHandle<()> {
    let mut watcher = state.degraded_watcher();
    tokio::spawn(async move {
        while watcher.changed().await.is_ok() {
            let degraded = *watcher.borrow_and_update();
            match ServerEvent::json(Some("system_status".to_string()), &SystemStatus { degraded }) {
                Ok(event) => {
                    state.lobby_sse().broadcast(event);
                }
                Err(err) => warn!(error = %err, "failed to encode system status"),
            }
        }
    })
}
