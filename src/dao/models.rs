use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::SystemTime};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Aggregate status of a lobby, derived from its active member count.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LobbyStatus {
    /// At least one member and at least one free slot.
    Open,
    /// Every slot is taken.
    Full,
    /// Everyone left. Terminal.
    Closed,
}

/// Role of a membership row inside its lobby.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberRole {
    /// The lobby owner. Exactly one per lobby.
    Leader,
    /// Anyone else.
    Member,
}

/// Lifecycle of a membership row. Rows are never deleted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberStatus {
    /// Currently occupying a slot.
    Active,
    /// Left on their own.
    Left,
    /// Removed by the leader.
    Kicked,
}

/// Raised when a persisted enum column holds an unknown value.
#[derive(Debug, Error)]
#[error("unknown {kind} value `{value}`")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

macro_rules! text_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            /// Stable textual form used by persistence backends.
            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok($ty::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_owned(),
                    }),
                }
            }
        }
    };
}

text_enum!(LobbyStatus, "lobby status", { Open => "OPEN", Full => "FULL", Closed => "CLOSED" });
text_enum!(MemberRole, "member role", { Leader => "LEADER", Member => "MEMBER" });
text_enum!(MemberStatus, "member status", { Active => "ACTIVE", Left => "LEFT", Kicked => "KICKED" });

/// Lobby row as persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LobbyEntity {
    /// Primary key of the lobby.
    pub id: Uuid,
    /// Actor who created the lobby. Never transferred.
    pub owner_id: Uuid,
    /// Reference into the external game catalog.
    pub game_id: Uuid,
    /// Display title.
    pub title: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub region: Option<String>,
    /// Capacity, within `2..=16`.
    pub max_players: u8,
    /// Derived from the active member count on every structural change.
    pub status: LobbyStatus,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

/// Membership row linking one user to one lobby.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LobbyMemberEntity {
    /// Primary key of the membership row.
    pub id: Uuid,
    pub lobby_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,
    pub status: MemberStatus,
    /// Last time this row became active.
    pub joined_at: SystemTime,
    pub updated_at: SystemTime,
}

impl LobbyMemberEntity {
    /// Whether the row currently occupies a slot.
    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }
}

/// A lobby together with every membership row it ever had.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbySnapshot {
    pub lobby: LobbyEntity,
    pub members: Vec<LobbyMemberEntity>,
}

impl LobbySnapshot {
    /// Number of rows currently active.
    pub fn active_count(&self) -> usize {
        self.members.iter().filter(|member| member.is_active()).count()
    }

    /// Active rows ordered by the time they (re)joined.
    pub fn active_members(&self) -> Vec<&LobbyMemberEntity> {
        let mut active: Vec<_> = self.members.iter().filter(|m| m.is_active()).collect();
        active.sort_by_key(|member| member.joined_at);
        active
    }

    /// The single row held by `user_id`, whatever its status.
    pub fn member_for_user(&self, user_id: Uuid) -> Option<&LobbyMemberEntity> {
        self.members.iter().find(|member| member.user_id == user_id)
    }

    /// Look up a row by its membership id.
    pub fn member(&self, membership_id: Uuid) -> Option<&LobbyMemberEntity> {
        self.members.iter().find(|member| member.id == membership_id)
    }
}

/// Listing projection: a lobby with its active member count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyListItemEntity {
    pub lobby: LobbyEntity,
    pub active_count: usize,
}

/// Criteria applied by [`crate::dao::lobby_store::LobbyStore::list_lobbies`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyFilter {
    /// Only lobbies in one of these statuses are returned.
    pub statuses: Vec<LobbyStatus>,
    pub game_id: Option<Uuid>,
    pub language: Option<String>,
    pub region: Option<String>,
    /// Maximum number of rows, newest first.
    pub limit: usize,
}

impl LobbyFilter {
    /// Whether `lobby` passes every criterion except the limit.
    pub fn matches(&self, lobby: &LobbyEntity) -> bool {
        self.statuses.contains(&lobby.status)
            && self.game_id.is_none_or(|game_id| lobby.game_id == game_id)
            && self
                .language
                .as_deref()
                .is_none_or(|language| lobby.language.as_deref() == Some(language))
            && self
                .region
                .as_deref()
                .is_none_or(|region| lobby.region.as_deref() == Some(region))
    }
}
