use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;
use uuid::Uuid;

use crate::{
    services::sse_service::{self, StreamScope},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sse/lobbies",
    tag = "sse",
    responses((status = 200, description = "Events of every lobby", content_type = "text/event-stream", body = String))
)]
/// Stream membership events of every lobby.
pub async fn lobbies_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let scope = StreamScope::AllLobbies;
    let (receiver, greeting) = sse_service::subscribe(&state, &scope);
    info!("New lobbies SSE connection");
    sse_service::to_sse_stream(receiver, scope, greeting)
}

#[utoipa::path(
    get,
    path = "/sse/lobbies/{lobby_id}",
    tag = "sse",
    params(("lobby_id" = Uuid, Path, description = "Lobby identifier")),
    responses((status = 200, description = "Events of one lobby", content_type = "text/event-stream", body = String))
)]
/// Stream membership events of a single lobby.
pub async fn lobby_stream(
    State(state): State<SharedState>,
    Path(lobby_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let scope = StreamScope::lobby(lobby_id);
    let (receiver, greeting) = sse_service::subscribe(&state, &scope);
    info!(%lobby_id, "New lobby SSE connection");
    sse_service::to_sse_stream(receiver, scope, greeting)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sse/lobbies", get(lobbies_stream))
        .route("/sse/lobbies/{lobby_id}", get(lobby_stream))
}
