use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the lobby service.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::lobbies_stream,
        crate::routes::sse::lobby_stream,
        crate::routes::lobbies::create_lobby,
        crate::routes::lobbies::list_lobbies,
        crate::routes::lobbies::get_lobby,
        crate::routes::lobbies::update_lobby,
        crate::routes::lobbies::join_lobby,
        crate::routes::lobbies::leave_lobby,
        crate::routes::lobbies::kick_member,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::lobby::CreateLobbyRequest,
            crate::dto::lobby::UpdateLobbyRequest,
            crate::dto::lobby::KickMemberRequest,
            crate::dto::lobby::MembershipResponse,
            crate::dto::lobby::LobbyDetail,
            crate::dto::lobby::MemberView,
            crate::dto::lobby::LobbySummary,
            crate::dto::lobby::LobbyListResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::LobbyEvent,
            crate::error::ErrorBody,
            crate::dao::models::LobbyStatus,
            crate::dao::models::MemberRole,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "lobbies", description = "Lobby lifecycle and membership"),
        (name = "sse", description = "Server-sent lobby events"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_lobby_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/lobbies",
            "/lobbies/{lobby_id}",
            "/lobbies/{lobby_id}/join",
            "/lobbies/{lobby_id}/leave",
            "/lobbies/{lobby_id}/kick",
            "/sse/lobbies/{lobby_id}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing");
        }
    }
}
