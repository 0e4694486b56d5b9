use std::{sync::Arc, time::Duration, time::SystemTime};

use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        lobby_store::LobbyStore,
        models::{LobbyEntity, LobbyMemberEntity, LobbySnapshot},
        storage::StorageError,
    },
    dto::{format_system_time, sse::LobbyEvent},
    services::{
        game_catalog::GameCatalog,
        notification::{LobbyNotifier, lobby_channel},
    },
    state::membership::{
        self, LeaderDeparture, LobbyPatch, MembershipError, MembershipOutcome, MembershipPlan,
        NewLobby,
    },
};

/// Policy and time limits applied by [`MembershipEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub leader_departure: LeaderDeparture,
    pub store_timeout: Duration,
    pub notify_timeout: Duration,
}

impl From<&AppConfig> for EngineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            leader_departure: config.leader_departure,
            store_timeout: config.store_timeout,
            notify_timeout: config.notify_timeout,
        }
    }
}

/// Runs membership plans inside a per-lobby store transaction and announces
/// committed changes.
///
/// Every structural operation reads the lobby under its lock, decides, writes
/// and commits before the lock is released. A timeout or a dropped future
/// abandons the transaction, which rolls it back.
#[derive(Clone)]
pub struct MembershipEngine {
    store: Arc<dyn LobbyStore>,
    notifier: Arc<dyn LobbyNotifier>,
    catalog: Arc<dyn GameCatalog>,
    settings: EngineSettings,
}

impl MembershipEngine {
    pub fn new(
        store: Arc<dyn LobbyStore>,
        notifier: Arc<dyn LobbyNotifier>,
        catalog: Arc<dyn GameCatalog>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            catalog,
            settings,
        }
    }

    /// Create a lobby with its owner seated as leader.
    pub async fn create_lobby(&self, input: NewLobby) -> Result<LobbySnapshot, MembershipError> {
        let (lobby, leader) = self.plan_lobby(input)?;
        self.insert_lobby(lobby, leader).await
    }

    /// Check the game and mint the lobby and leader rows.
    ///
    /// The rows carry fresh ids, so callers that retry should plan once and
    /// replay [`MembershipEngine::insert_lobby`] with the same rows.
    pub fn plan_lobby(
        &self,
        input: NewLobby,
    ) -> Result<(LobbyEntity, LobbyMemberEntity), MembershipError> {
        if !self.catalog.contains(input.game_id) {
            return Err(MembershipError::Validation {
                field: "gameId",
                reason: format!("unknown game `{}`", input.game_id),
            });
        }
        membership::plan_create(input, SystemTime::now())
    }

    /// Persist planned rows. Replaying rows that are already stored succeeds
    /// with the stored lobby.
    pub async fn insert_lobby(
        &self,
        lobby: LobbyEntity,
        leader: LobbyMemberEntity,
    ) -> Result<LobbySnapshot, MembershipError> {
        let insert = self.store.insert_lobby(lobby.clone(), leader.clone());
        match timeout(self.settings.store_timeout, insert).await {
            Ok(Ok(())) => {}
            Ok(Err(StorageError::Constraint { message })) => {
                return match self.already_inserted(&lobby, &leader).await? {
                    Some(existing) => {
                        debug!(lobby_id = %lobby.id, "lobby insert replayed");
                        Ok(existing)
                    }
                    None => Err(MembershipError::Validation {
                        field: "lobby",
                        reason: message,
                    }),
                };
            }
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => return Err(self.timed_out(lobby.id)),
        }

        info!(
            lobby_id = %lobby.id,
            owner_id = %lobby.owner_id,
            max_players = lobby.max_players,
            "lobby created"
        );
        Ok(LobbySnapshot {
            lobby,
            members: vec![leader],
        })
    }

    /// The stored lobby when it was created from these exact rows.
    async fn already_inserted(
        &self,
        lobby: &LobbyEntity,
        leader: &LobbyMemberEntity,
    ) -> Result<Option<LobbySnapshot>, MembershipError> {
        let lookup = self.store.find_lobby(lobby.id);
        let existing = match timeout(self.settings.store_timeout, lookup).await {
            Ok(result) => result?,
            Err(_) => return Err(self.timed_out(lobby.id)),
        };
        Ok(existing.filter(|stored| {
            stored.lobby.owner_id == lobby.owner_id
                && stored.members.iter().any(|member| member.id == leader.id)
        }))
    }

    /// Add `user_id` to the lobby, or do nothing when they are already active.
    pub async fn join_lobby(
        &self,
        lobby_id: Uuid,
        user_id: Uuid,
    ) -> Result<MembershipOutcome, MembershipError> {
        self.execute(lobby_id, |snapshot, now| {
            membership::plan_join(snapshot, user_id, now)
        })
        .await
    }

    /// Remove `user_id` from the lobby, or do nothing when they are not active.
    pub async fn leave_lobby(
        &self,
        lobby_id: Uuid,
        user_id: Uuid,
    ) -> Result<MembershipOutcome, MembershipError> {
        let policy = self.settings.leader_departure;
        self.execute(lobby_id, move |snapshot, now| {
            membership::plan_leave(snapshot, user_id, policy, now)
        })
        .await
    }

    /// Kick the member holding `membership_id` on behalf of `acting_user_id`.
    pub async fn kick_member(
        &self,
        lobby_id: Uuid,
        acting_user_id: Uuid,
        membership_id: Uuid,
    ) -> Result<MembershipOutcome, MembershipError> {
        self.execute(lobby_id, |snapshot, now| {
            membership::plan_kick(snapshot, acting_user_id, membership_id, now)
        })
        .await
    }

    /// Apply a leader edit to the lobby.
    pub async fn update_lobby(
        &self,
        lobby_id: Uuid,
        acting_user_id: Uuid,
        patch: LobbyPatch,
    ) -> Result<MembershipOutcome, MembershipError> {
        self.execute(lobby_id, move |snapshot, now| {
            membership::plan_update(snapshot, acting_user_id, patch, now)
        })
        .await
    }

    async fn execute<F>(&self, lobby_id: Uuid, decide: F) -> Result<MembershipOutcome, MembershipError>
    where
        F: FnOnce(&LobbySnapshot, SystemTime) -> Result<MembershipPlan, MembershipError> + Send,
    {
        let outcome = match timeout(self.settings.store_timeout, self.transact(lobby_id, decide)).await
        {
            Ok(result) => result?,
            Err(_) => return Err(self.timed_out(lobby_id)),
        };

        if let Some(event) = outcome.event {
            info!(
                lobby_id = %outcome.lobby_id,
                user_id = %event.user_id,
                change = event.kind.event_name(),
                active_count = outcome.active_count,
                status = outcome.status.as_str(),
                "membership change committed"
            );
            self.announce(&outcome).await;
        } else {
            debug!(lobby_id = %lobby_id, "membership operation was a no-op");
        }
        Ok(outcome)
    }

    async fn transact<F>(&self, lobby_id: Uuid, decide: F) -> Result<MembershipOutcome, MembershipError>
    where
        F: FnOnce(&LobbySnapshot, SystemTime) -> Result<MembershipPlan, MembershipError>,
    {
        let mut tx = self
            .store
            .begin(lobby_id)
            .await?
            .ok_or(MembershipError::NotFound {
                what: "lobby",
                id: lobby_id,
            })?;

        let plan = decide(tx.snapshot(), SystemTime::now())?;
        if plan.is_noop() {
            return Ok(plan.outcome);
        }

        if let Some(lobby) = plan.lobby {
            tx.stage_lobby(lobby);
        }
        if let Some(member) = plan.member {
            tx.stage_member(member);
        }
        tx.commit().await?;
        Ok(plan.outcome)
    }

    /// Publish the committed change. Failures are logged and swallowed.
    async fn announce(&self, outcome: &MembershipOutcome) {
        let Some(event) = outcome.event else {
            return;
        };
        let payload = LobbyEvent {
            lobby_id: outcome.lobby_id,
            user_id: event.user_id,
            active_count: outcome.active_count,
            status: outcome.status,
            occurred_at: format_system_time(SystemTime::now()),
        };
        let name = event.kind.event_name();
        let publish = self
            .notifier
            .publish(lobby_channel(outcome.lobby_id), name, payload);

        match timeout(self.settings.notify_timeout, publish).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(
                lobby_id = %outcome.lobby_id,
                event = name,
                error = %err,
                "lobby notification failed"
            ),
            Err(_) => warn!(
                lobby_id = %outcome.lobby_id,
                event = name,
                timeout_ms = self.settings.notify_timeout.as_millis() as u64,
                "lobby notification timed out"
            ),
        }
    }

    fn timed_out(&self, lobby_id: Uuid) -> MembershipError {
        warn!(
            lobby_id = %lobby_id,
            timeout_ms = self.settings.store_timeout.as_millis() as u64,
            "lobby transaction timed out"
        );
        StorageError::transient(format!("transaction on lobby `{lobby_id}` timed out"), None)
            .into()
    }
}
