//! Pure decision logic for lobby membership.
//!
//! Every function here reads a [`LobbySnapshot`] taken under the lobby lock and
//! returns the rows to write plus the resulting occupancy. Nothing in this
//! module performs I/O; the membership service runs these plans inside a store
//! transaction.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::dao::{
    models::{
        LobbyEntity, LobbyMemberEntity, LobbySnapshot, LobbyStatus, MemberRole, MemberStatus,
    },
    storage::StorageError,
};

/// Smallest capacity a lobby may have.
pub const MIN_PLAYERS: u8 = 2;
/// Largest capacity a lobby may have.
pub const MAX_PLAYERS: u8 = 16;
/// Maximum title length, in characters.
pub const MAX_TITLE_CHARS: usize = 80;

/// What happens when the leader leaves a lobby that still has other members.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderDeparture {
    /// The leader can only leave as the last active member.
    #[default]
    ForbidWhileMembersRemain,
    /// The leader leaves like anyone else; ownership stays with them.
    Allow,
}

/// Kind of structural change a committed plan made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipChange {
    Joined,
    Left,
    Kicked,
    Updated,
}

impl MembershipChange {
    /// Event name used on the real-time channel.
    pub fn event_name(self) -> &'static str {
        match self {
            MembershipChange::Joined => "member.joined",
            MembershipChange::Left => "member.left",
            MembershipChange::Kicked => "member.kicked",
            MembershipChange::Updated => "lobby.updated",
        }
    }
}

/// The change a plan made and the user it concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MembershipEvent {
    pub kind: MembershipChange,
    pub user_id: Uuid,
}

/// Occupancy of a lobby after an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipOutcome {
    pub lobby_id: Uuid,
    pub active_count: usize,
    pub status: LobbyStatus,
    /// `None` when the operation was a no-op.
    pub event: Option<MembershipEvent>,
}

impl MembershipOutcome {
    pub fn changed(&self) -> bool {
        self.event.is_some()
    }
}

/// Rows to write in the current transaction and the occupancy they produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipPlan {
    pub lobby: Option<LobbyEntity>,
    pub member: Option<LobbyMemberEntity>,
    pub outcome: MembershipOutcome,
}

impl MembershipPlan {
    fn unchanged(snapshot: &LobbySnapshot) -> Self {
        Self {
            lobby: None,
            member: None,
            outcome: MembershipOutcome {
                lobby_id: snapshot.lobby.id,
                active_count: snapshot.active_count(),
                status: snapshot.lobby.status,
                event: None,
            },
        }
    }

    /// Whether committing this plan would write nothing.
    pub fn is_noop(&self) -> bool {
        self.lobby.is_none() && self.member.is_none()
    }
}

/// Failures surfaced by membership operations.
#[derive(Debug, Error)]
pub enum MembershipError {
    /// Malformed input, reported against a single field.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },
    #[error("{what} `{id}` not found")]
    NotFound { what: &'static str, id: Uuid },
    #[error("lobby `{lobby_id}` is closed")]
    Closed { lobby_id: Uuid },
    #[error("lobby `{lobby_id}` is full ({max_players} players)")]
    Full { lobby_id: Uuid, max_players: u8 },
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error(transparent)]
    Store(#[from] StorageError),
}

impl MembershipError {
    /// Only store-level transient failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, MembershipError::Store(err) if err.is_transient())
    }

    fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        MembershipError::Validation {
            field,
            reason: reason.into(),
        }
    }
}

/// Attributes of a lobby about to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLobby {
    pub owner_id: Uuid,
    pub game_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub region: Option<String>,
    pub max_players: u8,
}

/// Leader-only edit of a lobby's display attributes and capacity.
///
/// For the optional attributes, `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LobbyPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub language: Option<Option<String>>,
    pub region: Option<Option<String>>,
    pub max_players: Option<u8>,
}

/// The only place a lobby's status is computed.
pub fn derive_status(active_count: usize, max_players: u8) -> LobbyStatus {
    match active_count {
        0 => LobbyStatus::Closed,
        n if n >= usize::from(max_players) => LobbyStatus::Full,
        _ => LobbyStatus::Open,
    }
}

fn check_capacity(max_players: u8) -> Result<(), MembershipError> {
    if (MIN_PLAYERS..=MAX_PLAYERS).contains(&max_players) {
        Ok(())
    } else {
        Err(MembershipError::validation(
            "maxPlayers",
            format!("must be between {MIN_PLAYERS} and {MAX_PLAYERS} (got {max_players})"),
        ))
    }
}

fn clean_title(title: &str) -> Result<String, MembershipError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(MembershipError::validation("title", "must not be empty"));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(MembershipError::validation(
            "title",
            format!("must be at most {MAX_TITLE_CHARS} characters"),
        ));
    }
    Ok(title.to_owned())
}

/// Build the lobby row and its leader row for a new lobby.
pub fn plan_create(
    input: NewLobby,
    now: SystemTime,
) -> Result<(LobbyEntity, LobbyMemberEntity), MembershipError> {
    check_capacity(input.max_players)?;
    let title = clean_title(&input.title)?;

    let lobby = LobbyEntity {
        id: Uuid::new_v4(),
        owner_id: input.owner_id,
        game_id: input.game_id,
        title,
        description: input.description,
        language: input.language,
        region: input.region,
        max_players: input.max_players,
        status: derive_status(1, input.max_players),
        created_at: now,
        updated_at: now,
    };
    let leader = LobbyMemberEntity {
        id: Uuid::new_v4(),
        lobby_id: lobby.id,
        user_id: input.owner_id,
        role: MemberRole::Leader,
        status: MemberStatus::Active,
        joined_at: now,
        updated_at: now,
    };
    Ok((lobby, leader))
}

/// Stage `member` and the lobby status implied by `active_count`.
fn restage(
    snapshot: &LobbySnapshot,
    member: LobbyMemberEntity,
    active_count: usize,
    kind: MembershipChange,
    now: SystemTime,
) -> MembershipPlan {
    let mut lobby = snapshot.lobby.clone();
    lobby.status = derive_status(active_count, lobby.max_players);
    lobby.updated_at = now;

    let user_id = member.user_id;
    MembershipPlan {
        outcome: MembershipOutcome {
            lobby_id: lobby.id,
            active_count,
            status: lobby.status,
            event: Some(MembershipEvent { kind, user_id }),
        },
        lobby: Some(lobby),
        member: Some(member),
    }
}

/// Admit `user_id`, reusing their previous membership row when there is one.
pub fn plan_join(
    snapshot: &LobbySnapshot,
    user_id: Uuid,
    now: SystemTime,
) -> Result<MembershipPlan, MembershipError> {
    let lobby = &snapshot.lobby;
    if lobby.status == LobbyStatus::Closed {
        return Err(MembershipError::Closed { lobby_id: lobby.id });
    }

    let existing = snapshot.member_for_user(user_id);
    if existing.is_some_and(LobbyMemberEntity::is_active) {
        return Ok(MembershipPlan::unchanged(snapshot));
    }

    let active = snapshot.active_count();
    if active >= usize::from(lobby.max_players) {
        return Err(MembershipError::Full {
            lobby_id: lobby.id,
            max_players: lobby.max_players,
        });
    }

    // The owner's row keeps its leader role across leave/rejoin cycles.
    let role = if user_id == lobby.owner_id {
        MemberRole::Leader
    } else {
        MemberRole::Member
    };
    let member = match existing {
        Some(row) => LobbyMemberEntity {
            role,
            status: MemberStatus::Active,
            joined_at: now,
            updated_at: now,
            ..row.clone()
        },
        None => LobbyMemberEntity {
            id: Uuid::new_v4(),
            lobby_id: lobby.id,
            user_id,
            role,
            status: MemberStatus::Active,
            joined_at: now,
            updated_at: now,
        },
    };

    Ok(restage(
        snapshot,
        member,
        active + 1,
        MembershipChange::Joined,
        now,
    ))
}

/// Mark the caller's active row as left. No-op when they are not active.
pub fn plan_leave(
    snapshot: &LobbySnapshot,
    user_id: Uuid,
    policy: LeaderDeparture,
    now: SystemTime,
) -> Result<MembershipPlan, MembershipError> {
    let Some(row) = snapshot
        .member_for_user(user_id)
        .filter(|row| row.is_active())
    else {
        return Ok(MembershipPlan::unchanged(snapshot));
    };

    let active = snapshot.active_count();
    if row.role == MemberRole::Leader
        && policy == LeaderDeparture::ForbidWhileMembersRemain
        && active > 1
    {
        return Err(MembershipError::Forbidden(
            "the lobby leader cannot leave while other members remain".into(),
        ));
    }

    let member = LobbyMemberEntity {
        status: MemberStatus::Left,
        updated_at: now,
        ..row.clone()
    };
    Ok(restage(
        snapshot,
        member,
        active - 1,
        MembershipChange::Left,
        now,
    ))
}

/// Remove another member on the leader's behalf.
pub fn plan_kick(
    snapshot: &LobbySnapshot,
    acting_user_id: Uuid,
    membership_id: Uuid,
    now: SystemTime,
) -> Result<MembershipPlan, MembershipError> {
    let Some(target) = snapshot.member(membership_id) else {
        return Err(MembershipError::NotFound {
            what: "membership",
            id: membership_id,
        });
    };

    // Checked before the caller so the leader stays protected from anyone.
    if target.role == MemberRole::Leader {
        return Err(MembershipError::Forbidden(
            "the lobby leader cannot be kicked".into(),
        ));
    }
    if acting_user_id != snapshot.lobby.owner_id {
        return Err(MembershipError::Forbidden(
            "only the lobby leader can kick members".into(),
        ));
    }
    if !target.is_active() {
        return Ok(MembershipPlan::unchanged(snapshot));
    }

    let member = LobbyMemberEntity {
        status: MemberStatus::Kicked,
        updated_at: now,
        ..target.clone()
    };
    let active = snapshot.active_count() - 1;
    Ok(restage(
        snapshot,
        member,
        active,
        MembershipChange::Kicked,
        now,
    ))
}

/// Apply a leader edit, re-deriving status when the capacity changes.
pub fn plan_update(
    snapshot: &LobbySnapshot,
    acting_user_id: Uuid,
    patch: LobbyPatch,
    now: SystemTime,
) -> Result<MembershipPlan, MembershipError> {
    let current = &snapshot.lobby;
    if acting_user_id != current.owner_id {
        return Err(MembershipError::Forbidden(
            "only the lobby leader can edit the lobby".into(),
        ));
    }
    if current.status == LobbyStatus::Closed {
        return Err(MembershipError::Closed {
            lobby_id: current.id,
        });
    }

    let mut lobby = current.clone();
    if let Some(title) = patch.title {
        lobby.title = clean_title(&title)?;
    }
    if let Some(description) = patch.description {
        lobby.description = description;
    }
    if let Some(language) = patch.language {
        lobby.language = language;
    }
    if let Some(region) = patch.region {
        lobby.region = region;
    }

    let active = snapshot.active_count();
    if let Some(max_players) = patch.max_players {
        check_capacity(max_players)?;
        if usize::from(max_players) < active {
            return Err(MembershipError::validation(
                "maxPlayers",
                format!("cannot be lower than the {active} active members"),
            ));
        }
        lobby.max_players = max_players;
    }
    lobby.status = derive_status(active, lobby.max_players);

    if lobby == *current {
        return Ok(MembershipPlan::unchanged(snapshot));
    }
    lobby.updated_at = now;

    Ok(MembershipPlan {
        outcome: MembershipOutcome {
            lobby_id: lobby.id,
            active_count: active,
            status: lobby.status,
            event: Some(MembershipEvent {
                kind: MembershipChange::Updated,
                user_id: acting_user_id,
            }),
        },
        lobby: Some(lobby),
        member: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(max_players: u8) -> LobbySnapshot {
        let (lobby, leader) = plan_create(
            NewLobby {
                owner_id: Uuid::new_v4(),
                game_id: Uuid::new_v4(),
                title: "  duo queue ".into(),
                description: None,
                language: None,
                region: None,
                max_players,
            },
            SystemTime::now(),
        )
        .unwrap();
        LobbySnapshot {
            lobby,
            members: vec![leader],
        }
    }

    /// Write a plan into the snapshot the way a committed transaction would.
    fn commit(snapshot: &mut LobbySnapshot, plan: MembershipPlan) -> MembershipOutcome {
        if let Some(lobby) = plan.lobby {
            snapshot.lobby = lobby;
        }
        if let Some(member) = plan.member {
            match snapshot.members.iter_mut().find(|row| row.id == member.id) {
                Some(row) => *row = member,
                None => snapshot.members.push(member),
            }
        }
        plan.outcome
    }

    fn join(snapshot: &mut LobbySnapshot, user: Uuid) -> Result<MembershipOutcome, MembershipError> {
        let plan = plan_join(snapshot, user, SystemTime::now())?;
        Ok(commit(snapshot, plan))
    }

    fn leave(snapshot: &mut LobbySnapshot, user: Uuid) -> Result<MembershipOutcome, MembershipError> {
        let plan = plan_leave(
            snapshot,
            user,
            LeaderDeparture::ForbidWhileMembersRemain,
            SystemTime::now(),
        )?;
        Ok(commit(snapshot, plan))
    }

    fn assert_consistent(snapshot: &LobbySnapshot) {
        let active = snapshot.active_count();
        assert!(active <= usize::from(snapshot.lobby.max_players));
        assert_eq!(
            snapshot.lobby.status,
            derive_status(active, snapshot.lobby.max_players)
        );
        let mut users: Vec<_> = snapshot.members.iter().map(|m| m.user_id).collect();
        users.sort();
        users.dedup();
        assert_eq!(users.len(), snapshot.members.len());
        assert_eq!(
            snapshot
                .members
                .iter()
                .filter(|m| m.role == MemberRole::Leader)
                .count(),
            1
        );
    }

    #[test]
    fn derive_status_covers_every_band() {
        assert_eq!(derive_status(0, 4), LobbyStatus::Closed);
        assert_eq!(derive_status(1, 4), LobbyStatus::Open);
        assert_eq!(derive_status(3, 4), LobbyStatus::Open);
        assert_eq!(derive_status(4, 4), LobbyStatus::Full);
    }

    #[test]
    fn create_trims_title_and_seats_leader() {
        let snapshot = create(4);
        assert_eq!(snapshot.lobby.title, "duo queue");
        assert_eq!(snapshot.lobby.status, LobbyStatus::Open);
        assert_eq!(snapshot.active_count(), 1);
        assert_eq!(snapshot.members[0].user_id, snapshot.lobby.owner_id);
        assert_eq!(snapshot.members[0].role, MemberRole::Leader);
    }

    #[test]
    fn create_rejects_bad_capacity_and_blank_title() {
        let input = NewLobby {
            owner_id: Uuid::new_v4(),
            game_id: Uuid::new_v4(),
            title: "ok".into(),
            description: None,
            language: None,
            region: None,
            max_players: 17,
        };
        let err = plan_create(input.clone(), SystemTime::now()).unwrap_err();
        assert!(matches!(err, MembershipError::Validation { field: "maxPlayers", .. }));

        let err = plan_create(
            NewLobby {
                max_players: 1,
                ..input.clone()
            },
            SystemTime::now(),
        )
        .unwrap_err();
        assert!(matches!(err, MembershipError::Validation { field: "maxPlayers", .. }));

        let err = plan_create(
            NewLobby {
                title: "   ".into(),
                max_players: 2,
                ..input
            },
            SystemTime::now(),
        )
        .unwrap_err();
        assert!(matches!(err, MembershipError::Validation { field: "title", .. }));
    }

    #[test]
    fn two_player_lobby_lifecycle() {
        let mut lobby = create(2);
        let owner = lobby.lobby.owner_id;
        let (b, c) = (Uuid::new_v4(), Uuid::new_v4());

        let outcome = join(&mut lobby, b).unwrap();
        assert_eq!((outcome.active_count, outcome.status), (2, LobbyStatus::Full));

        let err = join(&mut lobby, c).unwrap_err();
        assert!(matches!(err, MembershipError::Full { max_players: 2, .. }));
        assert_eq!(lobby.active_count(), 2);

        let outcome = leave(&mut lobby, b).unwrap();
        assert_eq!((outcome.active_count, outcome.status), (1, LobbyStatus::Open));

        let outcome = leave(&mut lobby, owner).unwrap();
        assert_eq!((outcome.active_count, outcome.status), (0, LobbyStatus::Closed));

        let err = join(&mut lobby, c).unwrap_err();
        assert!(matches!(err, MembershipError::Closed { .. }));
        assert_consistent(&lobby);
    }

    #[test]
    fn joining_twice_is_idempotent() {
        let mut lobby = create(4);
        let user = Uuid::new_v4();

        let first = join(&mut lobby, user).unwrap();
        let rows_after_first = lobby.members.clone();
        let second = join(&mut lobby, user).unwrap();

        assert!(first.changed());
        assert!(!second.changed());
        assert_eq!(second.active_count, first.active_count);
        assert_eq!(second.status, first.status);
        assert_eq!(lobby.members, rows_after_first);
    }

    #[test]
    fn rejoin_reuses_previous_row() {
        let mut lobby = create(4);
        let user = Uuid::new_v4();
        join(&mut lobby, user).unwrap();
        let row_id = lobby.member_for_user(user).unwrap().id;

        leave(&mut lobby, user).unwrap();
        assert_eq!(lobby.member_for_user(user).unwrap().status, MemberStatus::Left);

        join(&mut lobby, user).unwrap();
        let row = lobby.member_for_user(user).unwrap();
        assert_eq!(row.id, row_id);
        assert_eq!(row.status, MemberStatus::Active);
        assert_eq!(row.role, MemberRole::Member);
        assert_eq!(lobby.members.len(), 2);
    }

    #[test]
    fn leaving_when_not_active_is_a_noop() {
        let mut lobby = create(4);
        let stranger = Uuid::new_v4();
        let before = lobby.clone();

        let outcome = leave(&mut lobby, stranger).unwrap();
        assert!(!outcome.changed());
        assert_eq!(lobby, before);
    }

    #[test]
    fn leader_departure_policy_is_enforced() {
        let mut lobby = create(4);
        let owner = lobby.lobby.owner_id;
        join(&mut lobby, Uuid::new_v4()).unwrap();

        let err = plan_leave(
            &lobby,
            owner,
            LeaderDeparture::ForbidWhileMembersRemain,
            SystemTime::now(),
        )
        .unwrap_err();
        assert!(matches!(err, MembershipError::Forbidden(_)));

        let plan = plan_leave(&lobby, owner, LeaderDeparture::Allow, SystemTime::now()).unwrap();
        let outcome = commit(&mut lobby, plan);
        assert_eq!((outcome.active_count, outcome.status), (1, LobbyStatus::Open));
        assert_eq!(lobby.lobby.owner_id, owner);

        // The owner comes back as leader.
        join(&mut lobby, owner).unwrap();
        assert_eq!(lobby.member_for_user(owner).unwrap().role, MemberRole::Leader);
        assert_consistent(&lobby);
    }

    #[test]
    fn kick_requires_leader_and_spares_the_leader() {
        let mut lobby = create(3);
        let owner = lobby.lobby.owner_id;
        let (b, c) = (Uuid::new_v4(), Uuid::new_v4());
        join(&mut lobby, b).unwrap();
        join(&mut lobby, c).unwrap();
        assert_eq!(lobby.lobby.status, LobbyStatus::Full);

        let leader_row = lobby.member_for_user(owner).unwrap().id;
        let b_row = lobby.member_for_user(b).unwrap().id;

        for actor in [owner, b, Uuid::new_v4()] {
            let err = plan_kick(&lobby, actor, leader_row, SystemTime::now()).unwrap_err();
            assert!(matches!(err, MembershipError::Forbidden(_)));
        }

        let err = plan_kick(&lobby, c, b_row, SystemTime::now()).unwrap_err();
        assert!(matches!(err, MembershipError::Forbidden(_)));

        let plan = plan_kick(&lobby, owner, b_row, SystemTime::now()).unwrap();
        let outcome = commit(&mut lobby, plan);
        assert_eq!((outcome.active_count, outcome.status), (2, LobbyStatus::Open));
        assert_eq!(outcome.event.unwrap().kind, MembershipChange::Kicked);
        assert_eq!(lobby.member(b_row).unwrap().status, MemberStatus::Kicked);

        let again = plan_kick(&lobby, owner, b_row, SystemTime::now()).unwrap();
        assert!(again.is_noop());

        let err = plan_kick(&lobby, owner, Uuid::new_v4(), SystemTime::now()).unwrap_err();
        assert!(matches!(err, MembershipError::NotFound { what: "membership", .. }));
    }

    #[test]
    fn kicked_user_can_rejoin() {
        let mut lobby = create(2);
        let owner = lobby.lobby.owner_id;
        let b = Uuid::new_v4();
        join(&mut lobby, b).unwrap();
        let row = lobby.member_for_user(b).unwrap().id;
        let plan = plan_kick(&lobby, owner, row, SystemTime::now()).unwrap();
        commit(&mut lobby, plan);

        let outcome = join(&mut lobby, b).unwrap();
        assert_eq!(outcome.status, LobbyStatus::Full);
        assert_eq!(lobby.members.len(), 2);
    }

    #[test]
    fn capacity_edit_rederives_status() {
        let mut lobby = create(4);
        let owner = lobby.lobby.owner_id;
        join(&mut lobby, Uuid::new_v4()).unwrap();

        let plan = plan_update(
            &lobby,
            owner,
            LobbyPatch {
                max_players: Some(2),
                ..LobbyPatch::default()
            },
            SystemTime::now(),
        )
        .unwrap();
        let outcome = commit(&mut lobby, plan);
        assert_eq!(outcome.status, LobbyStatus::Full);
        assert_consistent(&lobby);

        join(&mut lobby, Uuid::new_v4()).unwrap_err();

        let plan = plan_update(
            &lobby,
            owner,
            LobbyPatch {
                max_players: Some(5),
                title: Some("bigger squad".into()),
                ..LobbyPatch::default()
            },
            SystemTime::now(),
        )
        .unwrap();
        let outcome = commit(&mut lobby, plan);
        assert_eq!(outcome.status, LobbyStatus::Open);
        assert_eq!(lobby.lobby.title, "bigger squad");
    }

    #[test]
    fn capacity_edit_cannot_drop_below_active_count() {
        let mut lobby = create(4);
        let owner = lobby.lobby.owner_id;
        join(&mut lobby, Uuid::new_v4()).unwrap();
        join(&mut lobby, Uuid::new_v4()).unwrap();

        let err = plan_update(
            &lobby,
            owner,
            LobbyPatch {
                max_players: Some(2),
                ..LobbyPatch::default()
            },
            SystemTime::now(),
        )
        .unwrap_err();
        assert!(matches!(err, MembershipError::Validation { field: "maxPlayers", .. }));
    }

    #[test]
    fn edit_is_leader_only_and_empty_patch_is_noop() {
        let lobby = create(4);
        let err = plan_update(&lobby, Uuid::new_v4(), LobbyPatch::default(), SystemTime::now())
            .unwrap_err();
        assert!(matches!(err, MembershipError::Forbidden(_)));

        let plan = plan_update(
            &lobby,
            lobby.lobby.owner_id,
            LobbyPatch::default(),
            SystemTime::now(),
        )
        .unwrap();
        assert!(plan.is_noop());
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        #[derive(Debug, Clone)]
        enum Op {
            Join(usize),
            Leave(usize),
            Kick { actor: usize, target: usize },
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0usize..6).prop_map(Op::Join),
                (0usize..6).prop_map(Op::Leave),
                (0usize..6, 0usize..6).prop_map(|(actor, target)| Op::Kick { actor, target }),
            ]
        }

        proptest! {
            #[test]
            fn invariants_hold_for_any_sequence(
                max_players in MIN_PLAYERS..=6u8,
                allow_leader_exit in any::<bool>(),
                ops in proptest::collection::vec(op(), 1..60),
            ) {
                let mut lobby = create(max_players);
                // Index 0 is always the owner.
                let mut users = vec![lobby.lobby.owner_id];
                users.extend((1..6).map(|_| Uuid::new_v4()));
                let policy = if allow_leader_exit {
                    LeaderDeparture::Allow
                } else {
                    LeaderDeparture::ForbidWhileMembersRemain
                };

                for op in ops {
                    let result = match op {
                        Op::Join(user) => plan_join(&lobby, users[user], SystemTime::now()),
                        Op::Leave(user) => plan_leave(&lobby, users[user], policy, SystemTime::now()),
                        Op::Kick { actor, target } => {
                            match lobby.member_for_user(users[target]).map(|row| row.id) {
                                Some(row) => plan_kick(&lobby, users[actor], row, SystemTime::now()),
                                None => continue,
                            }
                        }
                    };
                    if let Ok(plan) = result {
                        commit(&mut lobby, plan);
                    }
                    assert_consistent(&lobby);
                }
            }

            #[test]
            fn closed_is_absorbing(max_players in MIN_PLAYERS..=6u8, joins in 1usize..6) {
                let mut lobby = create(max_players);
                let owner = lobby.lobby.owner_id;
                leave(&mut lobby, owner).unwrap();
                prop_assert_eq!(lobby.lobby.status, LobbyStatus::Closed);

                for _ in 0..joins {
                    let err = plan_join(&lobby, Uuid::new_v4(), SystemTime::now()).unwrap_err();
                    let closed = matches!(err, MembershipError::Closed { .. });
                    prop_assert!(closed);
                }
            }
        }
    }
}
