use std::future::Future;

use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::{
        models::{LobbyFilter, LobbyStatus},
        storage::{StorageError, StorageResult},
    },
    dto::lobby::{LobbyDetail, LobbyListResponse, LobbySummary, ListLobbiesQuery},
    error::ServiceError,
    state::SharedState,
};

/// Joinable lobbies (open or full) matching `query`, newest first.
///
/// Reads never take the lobby lock, so counts reflect the last committed state.
pub async fn list_lobbies(
    state: &SharedState,
    query: ListLobbiesQuery,
) -> Result<LobbyListResponse, ServiceError> {
    query.validate()?;
    let listing = state.config().listing;
    let limit = query
        .limit
        .unwrap_or(listing.default_limit)
        .min(listing.max_limit);

    let store = state.require_lobby_store().await?;
    let items = bounded(
        state,
        "list lobbies",
        store.list_lobbies(LobbyFilter {
            statuses: vec![LobbyStatus::Open, LobbyStatus::Full],
            game_id: query.game_id,
            language: query.language,
            region: query.region,
            limit,
        }),
    )
    .await?;

    debug!(count = items.len(), limit, "listed lobbies");
    Ok(LobbyListResponse {
        lobbies: items.iter().map(LobbySummary::from).collect(),
    })
}

/// Details and active members of one lobby, whatever its status.
pub async fn lobby_detail(state: &SharedState, lobby_id: Uuid) -> Result<LobbyDetail, ServiceError> {
    let store = state.require_lobby_store().await?;
    let snapshot = bounded(state, "load lobby", store.find_lobby(lobby_id))
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("lobby `{lobby_id}` not found")))?;
    Ok(LobbyDetail::from(&snapshot))
}

/// Run a store read under the configured store timeout.
async fn bounded<T>(
    state: &SharedState,
    what: &str,
    read: impl Future<Output = StorageResult<T>>,
) -> Result<T, ServiceError> {
    let limit = state.config().store_timeout;
    match timeout(limit, read).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            warn!(timeout_ms = limit.as_millis() as u64, "{what} timed out");
            Err(StorageError::transient(format!("{what} timed out"), None).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use futures::future::{self, BoxFuture};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            lobby_store::{LobbyStore, LobbyTransaction, MemoryLobbyStore},
            models::{LobbyEntity, LobbyListItemEntity, LobbyMemberEntity, LobbySnapshot},
        },
        state::{AppState, membership::NewLobby},
    };

    async fn seeded_state() -> (SharedState, Vec<Uuid>) {
        let state = AppState::new(AppConfig::default());
        state.set_lobby_store(Arc::new(MemoryLobbyStore::new())).await;
        let engine = state.membership_engine().await.unwrap();

        let mut ids = Vec::new();
        for (title, language) in [("first", "en"), ("second", "fr"), ("third", "en")] {
            let created = engine
                .create_lobby(NewLobby {
                    owner_id: Uuid::new_v4(),
                    game_id: Uuid::new_v4(),
                    title: title.into(),
                    description: None,
                    language: Some(language.into()),
                    region: None,
                    max_players: 2,
                })
                .await
                .unwrap();
            ids.push(created.lobby.id);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        (state, ids)
    }

    #[tokio::test]
    async fn listing_hides_closed_lobbies_and_filters() {
        let (state, ids) = seeded_state().await;
        let engine = state.membership_engine().await.unwrap();
        let closed = lobby_detail(&state, ids[0]).await.unwrap();
        engine.leave_lobby(ids[0], closed.owner_id).await.unwrap();

        let all = list_lobbies(&state, ListLobbiesQuery::default()).await.unwrap();
        let listed: Vec<_> = all.lobbies.iter().map(|l| l.id).collect();
        assert_eq!(listed, vec![ids[2], ids[1]]);

        let english = list_lobbies(
            &state,
            ListLobbiesQuery {
                language: Some("en".into()),
                ..ListLobbiesQuery::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(english.lobbies.len(), 1);
        assert_eq!(english.lobbies[0].id, ids[2]);

        // Closed lobbies remain reachable by id.
        let detail = lobby_detail(&state, ids[0]).await.unwrap();
        assert_eq!(detail.status, LobbyStatus::Closed);
        assert!(detail.members.is_empty());
    }

    #[tokio::test]
    async fn limit_is_capped_by_configuration() {
        let (state, _) = seeded_state().await;
        let page = list_lobbies(
            &state,
            ListLobbiesQuery {
                limit: Some(1),
                ..ListLobbiesQuery::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(page.lobbies.len(), 1);

        let err = list_lobbies(
            &state,
            ListLobbiesQuery {
                limit: Some(0),
                ..ListLobbiesQuery::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn unknown_lobby_detail_is_not_found() {
        let (state, _) = seeded_state().await;
        let err = lobby_detail(&state, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    /// Store whose reads never complete.
    struct StalledStore;

    impl LobbyStore for StalledStore {
        fn insert_lobby(
            &self,
            _lobby: LobbyEntity,
            _leader: LobbyMemberEntity,
        ) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(future::ready(Ok(())))
        }

        fn begin(
            &self,
            _lobby_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Option<Box<dyn LobbyTransaction>>>> {
            Box::pin(future::pending())
        }

        fn find_lobby(&self, _id: Uuid) -> BoxFuture<'static, StorageResult<Option<LobbySnapshot>>> {
            Box::pin(future::pending())
        }

        fn list_lobbies(
            &self,
            _filter: LobbyFilter,
        ) -> BoxFuture<'static, StorageResult<Vec<LobbyListItemEntity>>> {
            Box::pin(future::pending())
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(future::ready(Ok(())))
        }
    }

    #[tokio::test]
    async fn stalled_reads_give_up_after_the_store_timeout() {
        let state = AppState::new(AppConfig {
            store_timeout: Duration::from_millis(50),
            ..AppConfig::default()
        });
        state.set_lobby_store(Arc::new(StalledStore)).await;

        let err = list_lobbies(&state, ListLobbiesQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Transient(_)));

        let err = lobby_detail(&state, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Transient(_)));
    }
}
