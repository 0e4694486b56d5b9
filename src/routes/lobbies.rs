use std::convert::Infallible;

use axum::{
    Json, Router,
    extract::{
        FromRequestParts, Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, request::Parts},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::lobby::{
        CreateLobbyRequest, KickMemberRequest, ListLobbiesQuery, LobbyDetail, LobbyListResponse,
        MembershipResponse, UpdateLobbyRequest,
    },
    error::{AppError, ErrorBody},
    services::{
        command_service::{self, CommandOutcome, LobbyCommand},
        identity::Actor,
        lobby_query_service,
    },
    state::SharedState,
};

/// Caller identity as resolved by the configured provider. `None` when anonymous.
pub struct Caller(pub Option<Actor>);

impl FromRequestParts<SharedState> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Caller(state.identity().current_actor(&parts.headers)))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest {
            field: None,
            message: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest {
            field: Some("lobbyId".into()),
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest {
            field: None,
            message: rejection.body_text(),
        }
    }
}

/// Lobby commands and queries.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/lobbies", get(list_lobbies).post(create_lobby))
        .route("/lobbies/{lobby_id}", get(get_lobby).patch(update_lobby))
        .route("/lobbies/{lobby_id}/join", post(join_lobby))
        .route("/lobbies/{lobby_id}/leave", post(leave_lobby))
        .route("/lobbies/{lobby_id}/kick", post(kick_member))
}

fn membership(outcome: CommandOutcome) -> Result<Json<MembershipResponse>, AppError> {
    match outcome {
        CommandOutcome::Membership(response) => Ok(Json(response)),
        CommandOutcome::Created(_) => Err(AppError::Internal("unexpected command outcome".into())),
    }
}

/// Open a lobby owned by the caller, who joins it as leader.
#[utoipa::path(
    post,
    path = "/lobbies",
    tag = "lobbies",
    request_body = CreateLobbyRequest,
    responses(
        (status = 201, description = "Lobby created", body = LobbyDetail),
        (status = 400, description = "Invalid payload", body = ErrorBody),
        (status = 401, description = "No caller identity", body = ErrorBody),
    )
)]
pub async fn create_lobby(
    State(state): State<SharedState>,
    Caller(actor): Caller,
    payload: Result<Json<CreateLobbyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LobbyDetail>), AppError> {
    let actor = command_service::authenticate(actor)?;
    let Json(request) = payload?;
    match command_service::execute(&state, Some(actor), LobbyCommand::Create(request)).await? {
        CommandOutcome::Created(detail) => Ok((StatusCode::CREATED, Json(detail))),
        CommandOutcome::Membership(_) => {
            Err(AppError::Internal("unexpected command outcome".into()))
        }
    }
}

/// List joinable lobbies, newest first.
#[utoipa::path(
    get,
    path = "/lobbies",
    tag = "lobbies",
    params(ListLobbiesQuery),
    responses(
        (status = 200, description = "Open and full lobbies", body = LobbyListResponse),
        (status = 400, description = "Invalid filter", body = ErrorBody),
    )
)]
pub async fn list_lobbies(
    State(state): State<SharedState>,
    query: Result<Query<ListLobbiesQuery>, QueryRejection>,
) -> Result<Json<LobbyListResponse>, AppError> {
    let Query(query) = query?;
    Ok(Json(lobby_query_service::list_lobbies(&state, query).await?))
}

/// Lobby details with its active members.
#[utoipa::path(
    get,
    path = "/lobbies/{lobby_id}",
    tag = "lobbies",
    params(("lobby_id" = Uuid, Path, description = "Lobby identifier")),
    responses(
        (status = 200, description = "Lobby", body = LobbyDetail),
        (status = 404, description = "Unknown lobby", body = ErrorBody),
    )
)]
pub async fn get_lobby(
    State(state): State<SharedState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<LobbyDetail>, AppError> {
    let Path(lobby_id) = path?;
    Ok(Json(lobby_query_service::lobby_detail(&state, lobby_id).await?))
}

/// Edit the lobby. Leader only.
#[utoipa::path(
    patch,
    path = "/lobbies/{lobby_id}",
    tag = "lobbies",
    params(("lobby_id" = Uuid, Path, description = "Lobby identifier")),
    request_body = UpdateLobbyRequest,
    responses(
        (status = 200, description = "Lobby updated", body = MembershipResponse),
        (status = 400, description = "Invalid payload", body = ErrorBody),
        (status = 403, description = "Caller is not the leader", body = ErrorBody),
        (status = 409, description = "Lobby closed", body = ErrorBody),
    )
)]
pub async fn update_lobby(
    State(state): State<SharedState>,
    Caller(actor): Caller,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateLobbyRequest>, JsonRejection>,
) -> Result<Json<MembershipResponse>, AppError> {
    let actor = command_service::authenticate(actor)?;
    let Path(lobby_id) = path?;
    let Json(request) = payload?;
    let outcome = command_service::execute(
        &state,
        Some(actor),
        LobbyCommand::Update { lobby_id, request },
    )
    .await?;
    membership(outcome)
}

/// Join the lobby. Joining twice is a no-op.
#[utoipa::path(
    post,
    path = "/lobbies/{lobby_id}/join",
    tag = "lobbies",
    params(("lobby_id" = Uuid, Path, description = "Lobby identifier")),
    responses(
        (status = 200, description = "Caller is an active member", body = MembershipResponse),
        (status = 404, description = "Unknown lobby", body = ErrorBody),
        (status = 409, description = "Lobby full or closed", body = ErrorBody),
        (status = 503, description = "Store contended or unavailable", body = ErrorBody),
    )
)]
pub async fn join_lobby(
    State(state): State<SharedState>,
    Caller(actor): Caller,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<MembershipResponse>, AppError> {
    let actor = command_service::authenticate(actor)?;
    let Path(lobby_id) = path?;
    let outcome =
        command_service::execute(&state, Some(actor), LobbyCommand::Join { lobby_id }).await?;
    membership(outcome)
}

/// Leave the lobby. Leaving when not a member is a no-op.
#[utoipa::path(
    post,
    path = "/lobbies/{lobby_id}/leave",
    tag = "lobbies",
    params(("lobby_id" = Uuid, Path, description = "Lobby identifier")),
    responses(
        (status = 200, description = "Caller is no longer active", body = MembershipResponse),
        (status = 403, description = "Leader cannot leave a populated lobby", body = ErrorBody),
        (status = 404, description = "Unknown lobby", body = ErrorBody),
    )
)]
pub async fn leave_lobby(
    State(state): State<SharedState>,
    Caller(actor): Caller,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<MembershipResponse>, AppError> {
    let actor = command_service::authenticate(actor)?;
    let Path(lobby_id) = path?;
    let outcome =
        command_service::execute(&state, Some(actor), LobbyCommand::Leave { lobby_id }).await?;
    membership(outcome)
}

/// Remove a member. Leader only; the leader cannot be kicked.
#[utoipa::path(
    post,
    path = "/lobbies/{lobby_id}/kick",
    tag = "lobbies",
    params(("lobby_id" = Uuid, Path, description = "Lobby identifier")),
    request_body = KickMemberRequest,
    responses(
        (status = 200, description = "Member removed", body = MembershipResponse),
        (status = 403, description = "Not allowed", body = ErrorBody),
        (status = 404, description = "Unknown lobby or membership", body = ErrorBody),
    )
)]
pub async fn kick_member(
    State(state): State<SharedState>,
    Caller(actor): Caller,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<KickMemberRequest>, JsonRejection>,
) -> Result<Json<MembershipResponse>, AppError> {
    let actor = command_service::authenticate(actor)?;
    let Path(lobby_id) = path?;
    let Json(request) = payload?;
    let outcome = command_service::execute(
        &state,
        Some(actor),
        LobbyCommand::Kick { lobby_id, request },
    )
    .await?;
    membership(outcome)
}
