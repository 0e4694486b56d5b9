use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::{
        LobbyListItemEntity, LobbyMemberEntity, LobbySnapshot, LobbyStatus, MemberRole,
    },
    dto::{
        format_system_time,
        validation::{validate_language, validate_region, validate_title},
    },
    state::membership::{LobbyPatch, MAX_PLAYERS, MIN_PLAYERS, MembershipOutcome, NewLobby},
};

/// Maximum description length, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// Payload used to open a new lobby. The caller becomes its leader.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateLobbyRequest {
    pub game_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Capacity, between 2 and 16.
    pub max_players: i64,
    /// Language tag such as `en` or `pt-BR`.
    #[serde(default)]
    pub language: Option<String>,
    /// Region code such as `EU` or `NA`.
    #[serde(default)]
    pub region: Option<String>,
}

impl Validate for CreateLobbyRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_title(&self.title) {
            errors.add("title", e);
        }
        if let Err(e) = check_max_players(self.max_players) {
            errors.add("maxPlayers", e);
        }
        check_optional_text(
            &mut errors,
            self.description.as_deref(),
            self.language.as_deref(),
            self.region.as_deref(),
        );

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl CreateLobbyRequest {
    /// Normalise the payload into engine input owned by `owner_id`.
    pub fn into_new_lobby(self, owner_id: Uuid) -> NewLobby {
        NewLobby {
            owner_id,
            game_id: self.game_id,
            title: self.title.trim().to_owned(),
            description: normalized(self.description),
            language: normalized(self.language),
            region: normalized(self.region),
            max_players: u8::try_from(self.max_players).unwrap_or(u8::MAX),
        }
    }
}

/// Leader-only lobby edit.
///
/// Omitted fields are left untouched. For `description`, `language` and
/// `region`, an explicit `null` clears the value.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLobbyRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>)]
    pub language: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>)]
    pub region: Option<Option<String>>,
    #[serde(default)]
    pub max_players: Option<i64>,
}

impl Validate for UpdateLobbyRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Some(title) = &self.title
            && let Err(e) = validate_title(title)
        {
            errors.add("title", e);
        }
        if let Some(max_players) = self.max_players
            && let Err(e) = check_max_players(max_players)
        {
            errors.add("maxPlayers", e);
        }
        check_optional_text(
            &mut errors,
            self.description.as_ref().and_then(Option::as_deref),
            self.language.as_ref().and_then(Option::as_deref),
            self.region.as_ref().and_then(Option::as_deref),
        );

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl UpdateLobbyRequest {
    /// Normalise the payload into an engine patch.
    pub fn into_patch(self) -> LobbyPatch {
        LobbyPatch {
            title: self.title.map(|title| title.trim().to_owned()),
            description: self.description.map(normalized),
            language: self.language.map(normalized),
            region: self.region.map(normalized),
            max_players: self
                .max_players
                .map(|value| u8::try_from(value).unwrap_or(u8::MAX)),
        }
    }
}

/// Identifies the membership row to kick.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KickMemberRequest {
    pub membership_id: Uuid,
}

/// Filters accepted by the lobby listing.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListLobbiesQuery {
    pub game_id: Option<Uuid>,
    pub language: Option<String>,
    pub region: Option<String>,
    /// Page size; capped by the server.
    pub limit: Option<usize>,
}

impl Validate for ListLobbiesQuery {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Some(language) = &self.language
            && let Err(e) = validate_language(language)
        {
            errors.add("language", e);
        }
        if let Some(region) = &self.region
            && let Err(e) = validate_region(region)
        {
            errors.add("region", e);
        }
        if self.limit == Some(0) {
            let mut e = validator::ValidationError::new("limit_range");
            e.message = Some("Limit must be at least 1".into());
            errors.add("limit", e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Occupancy returned by join, leave and kick.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MembershipResponse {
    pub lobby_id: Uuid,
    pub members_count: usize,
    pub status: LobbyStatus,
    /// `false` when the call was an idempotent no-op.
    pub changed: bool,
}

impl From<MembershipOutcome> for MembershipResponse {
    fn from(outcome: MembershipOutcome) -> Self {
        Self {
            lobby_id: outcome.lobby_id,
            members_count: outcome.active_count,
            status: outcome.status,
            changed: outcome.changed(),
        }
    }
}

/// Active member as shown in lobby details.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    pub membership_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,
    pub joined_at: String,
}

impl From<&LobbyMemberEntity> for MemberView {
    fn from(member: &LobbyMemberEntity) -> Self {
        Self {
            membership_id: member.id,
            user_id: member.user_id,
            role: member.role,
            joined_at: format_system_time(member.joined_at),
        }
    }
}

/// Full view of one lobby with its active members.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LobbyDetail {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub game_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub region: Option<String>,
    pub max_players: u8,
    pub status: LobbyStatus,
    pub members_count: usize,
    pub members: Vec<MemberView>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&LobbySnapshot> for LobbyDetail {
    fn from(snapshot: &LobbySnapshot) -> Self {
        let lobby = &snapshot.lobby;
        let members: Vec<MemberView> = snapshot
            .active_members()
            .into_iter()
            .map(MemberView::from)
            .collect();
        Self {
            id: lobby.id,
            owner_id: lobby.owner_id,
            game_id: lobby.game_id,
            title: lobby.title.clone(),
            description: lobby.description.clone(),
            language: lobby.language.clone(),
            region: lobby.region.clone(),
            max_players: lobby.max_players,
            status: lobby.status,
            members_count: members.len(),
            members,
            created_at: format_system_time(lobby.created_at),
            updated_at: format_system_time(lobby.updated_at),
        }
    }
}

/// Listing entry.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LobbySummary {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub game_id: Uuid,
    pub title: String,
    pub language: Option<String>,
    pub region: Option<String>,
    pub max_players: u8,
    pub status: LobbyStatus,
    pub members_count: usize,
    pub created_at: String,
}

impl From<&LobbyListItemEntity> for LobbySummary {
    fn from(item: &LobbyListItemEntity) -> Self {
        let lobby = &item.lobby;
        Self {
            id: lobby.id,
            owner_id: lobby.owner_id,
            game_id: lobby.game_id,
            title: lobby.title.clone(),
            language: lobby.language.clone(),
            region: lobby.region.clone(),
            max_players: lobby.max_players,
            status: lobby.status,
            members_count: item.active_count,
            created_at: format_system_time(lobby.created_at),
        }
    }
}

/// Response payload of the lobby listing, newest first.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LobbyListResponse {
    pub lobbies: Vec<LobbySummary>,
}

fn check_max_players(value: i64) -> Result<(), validator::ValidationError> {
    if (i64::from(MIN_PLAYERS)..=i64::from(MAX_PLAYERS)).contains(&value) {
        return Ok(());
    }
    let mut err = validator::ValidationError::new("max_players_range");
    err.message = Some(
        format!("Max players must be between {MIN_PLAYERS} and {MAX_PLAYERS} (got {value})").into(),
    );
    Err(err)
}

fn check_optional_text(
    errors: &mut ValidationErrors,
    description: Option<&str>,
    language: Option<&str>,
    region: Option<&str>,
) {
    if let Some(description) = description
        && description.trim().chars().count() > MAX_DESCRIPTION_CHARS
    {
        let mut e = validator::ValidationError::new("description_length");
        e.message =
            Some(format!("Description must be at most {MAX_DESCRIPTION_CHARS} characters").into());
        errors.add("description", e);
    }
    // Blank language/region are treated as absent.
    if let Some(language) = language.map(str::trim).filter(|s| !s.is_empty())
        && let Err(e) = validate_language(language)
    {
        errors.add("language", e);
    }
    if let Some(region) = region.map(str::trim).filter(|s| !s.is_empty())
        && let Err(e) = validate_region(region)
    {
        errors.add("region", e);
    }
}

/// Trim, mapping blank strings to `None`.
fn normalized(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_owned())
        .filter(|trimmed| !trimmed.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_request(json: serde_json::Value) -> CreateLobbyRequest {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn create_request_accepts_minimal_payload() {
        let request = create_request(serde_json::json!({
            "gameId": Uuid::new_v4(),
            "title": "  Night raid ",
            "maxPlayers": 4,
            "description": "   "
        }));
        assert!(request.validate().is_ok());

        let owner = Uuid::new_v4();
        let input = request.into_new_lobby(owner);
        assert_eq!(input.title, "Night raid");
        assert_eq!(input.description, None);
        assert_eq!(input.max_players, 4);
        assert_eq!(input.owner_id, owner);
    }

    #[test]
    fn create_request_reports_each_bad_field() {
        let request = create_request(serde_json::json!({
            "gameId": Uuid::new_v4(),
            "title": "",
            "maxPlayers": 40,
            "language": "english",
            "region": "eu"
        }));
        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();
        for field in ["title", "maxPlayers", "language", "region"] {
            assert!(fields.contains_key(field), "missing error for {field}");
        }
    }

    #[test]
    fn update_request_distinguishes_null_from_missing() {
        let request: UpdateLobbyRequest = serde_json::from_value(serde_json::json!({
            "description": null,
            "region": "NA"
        }))
        .unwrap();
        assert!(request.validate().is_ok());

        let patch = request.into_patch();
        assert_eq!(patch.description, Some(None));
        assert_eq!(patch.region, Some(Some("NA".into())));
        assert_eq!(patch.language, None);
        assert_eq!(patch.title, None);
    }

    #[test]
    fn list_query_rejects_zero_limit_and_bad_language() {
        let query = ListLobbiesQuery {
            limit: Some(0),
            language: Some("EN".into()),
            ..ListLobbiesQuery::default()
        };
        let errors = query.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("limit"));
        assert!(errors.field_errors().contains_key("language"));
    }
}
