use std::{cmp::Reverse, sync::Arc};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::{self, BoxFuture};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::{LobbyStore, LobbyTransaction};
use crate::dao::{
    models::{LobbyEntity, LobbyFilter, LobbyListItemEntity, LobbyMemberEntity, LobbySnapshot},
    storage::{StorageError, StorageResult},
};

/// In-process lobby store. Each lobby has its own async mutex acting as the
/// row lock; the last committed snapshot lives beside it so readers never
/// queue behind a writer.
#[derive(Clone, Default)]
pub struct MemoryLobbyStore {
    lobbies: Arc<DashMap<Uuid, Arc<LobbyCell>>>,
}

struct LobbyCell {
    row_lock: Arc<Mutex<()>>,
    committed: RwLock<LobbySnapshot>,
}

impl MemoryLobbyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, id: Uuid) -> Option<Arc<LobbyCell>> {
        self.lobbies.get(&id).map(|entry| entry.value().clone())
    }

    fn insert(&self, lobby: LobbyEntity, leader: LobbyMemberEntity) -> StorageResult<()> {
        if leader.lobby_id != lobby.id {
            return Err(StorageError::Constraint {
                message: format!(
                    "leader row references lobby `{}` instead of `{}`",
                    leader.lobby_id, lobby.id
                ),
            });
        }

        match self.lobbies.entry(lobby.id) {
            Entry::Occupied(_) => Err(StorageError::Constraint {
                message: format!("lobby `{}` already exists", lobby.id),
            }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(LobbyCell {
                    row_lock: Arc::new(Mutex::new(())),
                    committed: RwLock::new(LobbySnapshot {
                        lobby,
                        members: vec![leader],
                    }),
                }));
                Ok(())
            }
        }
    }
}

impl LobbyStore for MemoryLobbyStore {
    fn insert_lobby(
        &self,
        lobby: LobbyEntity,
        leader: LobbyMemberEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(future::ready(self.insert(lobby, leader)))
    }

    fn begin(
        &self,
        lobby_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<Box<dyn LobbyTransaction>>>> {
        let cell = self.cell(lobby_id);
        Box::pin(async move {
            let Some(cell) = cell else {
                return Ok(None);
            };
            let guard = cell.row_lock.clone().lock_owned().await;
            // Read under the row lock so the working copy is the latest commit.
            let working = cell.committed.read().await.clone();
            let tx: Box<dyn LobbyTransaction> = Box::new(MemoryTransaction {
                cell,
                _guard: guard,
                working,
                staged_lobby: None,
                staged_members: Vec::new(),
            });
            Ok(Some(tx))
        })
    }

    fn find_lobby(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<LobbySnapshot>>> {
        let cell = self.cell(id);
        Box::pin(async move {
            match cell {
                Some(cell) => Ok(Some(cell.committed.read().await.clone())),
                None => Ok(None),
            }
        })
    }

    fn list_lobbies(
        &self,
        filter: LobbyFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<LobbyListItemEntity>>> {
        let cells: Vec<_> = self
            .lobbies
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        Box::pin(async move {
            let mut items = Vec::new();
            for cell in cells {
                let snapshot = cell.committed.read().await;
                if filter.matches(&snapshot.lobby) {
                    items.push(LobbyListItemEntity {
                        lobby: snapshot.lobby.clone(),
                        active_count: snapshot.active_count(),
                    });
                }
            }
            items.sort_by_key(|item| Reverse(item.lobby.created_at));
            items.truncate(filter.limit);
            Ok(items)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(future::ready(Ok(())))
    }
}

struct MemoryTransaction {
    cell: Arc<LobbyCell>,
    _guard: OwnedMutexGuard<()>,
    working: LobbySnapshot,
    staged_lobby: Option<LobbyEntity>,
    staged_members: Vec<LobbyMemberEntity>,
}

impl MemoryTransaction {
    fn apply(&mut self) -> StorageResult<()> {
        let lobby_id = self.working.lobby.id;

        for member in &self.staged_members {
            if member.lobby_id != lobby_id {
                return Err(StorageError::Constraint {
                    message: format!("membership `{}` belongs to another lobby", member.id),
                });
            }
            let duplicate = self
                .working
                .members
                .iter()
                .any(|existing| existing.user_id == member.user_id && existing.id != member.id);
            if duplicate {
                return Err(StorageError::Constraint {
                    message: format!(
                        "user `{}` already has a membership row in lobby `{lobby_id}`",
                        member.user_id
                    ),
                });
            }
        }

        if let Some(lobby) = self.staged_lobby.take() {
            self.working.lobby = lobby;
        }
        for member in self.staged_members.drain(..) {
            match self.working.members.iter_mut().find(|row| row.id == member.id) {
                Some(row) => *row = member,
                None => self.working.members.push(member),
            }
        }
        Ok(())
    }
}

impl LobbyTransaction for MemoryTransaction {
    fn snapshot(&self) -> &LobbySnapshot {
        &self.working
    }

    fn stage_lobby(&mut self, lobby: LobbyEntity) {
        self.staged_lobby = Some(lobby);
    }

    fn stage_member(&mut self, member: LobbyMemberEntity) {
        match self.staged_members.iter_mut().find(|row| row.id == member.id) {
            Some(row) => *row = member,
            None => self.staged_members.push(member),
        }
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, StorageResult<()>> {
        let mut tx = *self;
        Box::pin(async move {
            tx.apply()?;
            // Publish while still holding the row lock.
            *tx.cell.committed.write().await = tx.working;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::dao::models::{LobbyStatus, MemberRole, MemberStatus};

    fn new_lobby(created_at: SystemTime) -> (LobbyEntity, LobbyMemberEntity) {
        let owner_id = Uuid::new_v4();
        let lobby = LobbyEntity {
            id: Uuid::new_v4(),
            owner_id,
            game_id: Uuid::new_v4(),
            title: "ranked duo".into(),
            description: None,
            language: Some("en".into()),
            region: Some("EU".into()),
            max_players: 2,
            status: LobbyStatus::Open,
            created_at,
            updated_at: created_at,
        };
        let leader = LobbyMemberEntity {
            id: Uuid::new_v4(),
            lobby_id: lobby.id,
            user_id: owner_id,
            role: MemberRole::Leader,
            status: MemberStatus::Active,
            joined_at: created_at,
            updated_at: created_at,
        };
        (lobby, leader)
    }

    fn member_of(lobby: &LobbyEntity) -> LobbyMemberEntity {
        LobbyMemberEntity {
            id: Uuid::new_v4(),
            lobby_id: lobby.id,
            user_id: Uuid::new_v4(),
            role: MemberRole::Member,
            status: MemberStatus::Active,
            joined_at: SystemTime::now(),
            updated_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_trace() {
        let store = MemoryLobbyStore::new();
        let (lobby, leader) = new_lobby(SystemTime::now());
        store.insert_lobby(lobby.clone(), leader).await.unwrap();

        {
            let mut tx = store.begin(lobby.id).await.unwrap().unwrap();
            tx.stage_member(member_of(&lobby));
        }

        let snapshot = store.find_lobby(lobby.id).await.unwrap().unwrap();
        assert_eq!(snapshot.members.len(), 1);
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let store = MemoryLobbyStore::new();
        let (lobby, leader) = new_lobby(SystemTime::now());
        store.insert_lobby(lobby.clone(), leader).await.unwrap();

        let mut tx = store.begin(lobby.id).await.unwrap().unwrap();
        tx.stage_member(member_of(&lobby));
        let mut full = lobby.clone();
        full.status = LobbyStatus::Full;
        tx.stage_lobby(full);
        tx.commit().await.unwrap();

        let snapshot = store.find_lobby(lobby.id).await.unwrap().unwrap();
        assert_eq!(snapshot.active_count(), 2);
        assert_eq!(snapshot.lobby.status, LobbyStatus::Full);
    }

    #[tokio::test]
    async fn second_row_for_same_user_is_rejected() {
        let store = MemoryLobbyStore::new();
        let (lobby, leader) = new_lobby(SystemTime::now());
        store.insert_lobby(lobby.clone(), leader.clone()).await.unwrap();

        let mut tx = store.begin(lobby.id).await.unwrap().unwrap();
        let mut duplicate = member_of(&lobby);
        duplicate.user_id = leader.user_id;
        tx.stage_member(duplicate);
        let err = tx.commit().await.unwrap_err();
        assert!(matches!(err, StorageError::Constraint { .. }));
    }

    #[tokio::test]
    async fn begin_on_unknown_lobby_returns_none() {
        let store = MemoryLobbyStore::new();
        assert!(store.begin(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn listing_is_newest_first_and_limited() {
        let store = MemoryLobbyStore::new();
        let base = SystemTime::now();
        let mut ids = Vec::new();
        for offset in 0..3 {
            let (lobby, leader) = new_lobby(base + Duration::from_secs(offset));
            ids.push(lobby.id);
            store.insert_lobby(lobby, leader).await.unwrap();
        }

        let items = store
            .list_lobbies(LobbyFilter {
                statuses: vec![LobbyStatus::Open, LobbyStatus::Full],
                game_id: None,
                language: None,
                region: Some("EU".into()),
                limit: 2,
            })
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].lobby.id, ids[2]);
        assert_eq!(items[1].lobby.id, ids[1]);
        assert!(items.iter().all(|item| item.active_count == 1));
    }

    #[tokio::test]
    async fn reads_do_not_wait_for_an_open_transaction() {
        let store = MemoryLobbyStore::new();
        let (lobby, leader) = new_lobby(SystemTime::now());
        store.insert_lobby(lobby.clone(), leader).await.unwrap();

        let mut tx = store.begin(lobby.id).await.unwrap().unwrap();
        tx.stage_member(member_of(&lobby));

        let wait = Duration::from_millis(200);
        let snapshot = tokio::time::timeout(wait, store.find_lobby(lobby.id))
            .await
            .expect("find_lobby blocked behind the row lock")
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.active_count(), 1);

        let items = tokio::time::timeout(
            wait,
            store.list_lobbies(LobbyFilter {
                statuses: vec![LobbyStatus::Open, LobbyStatus::Full],
                game_id: None,
                language: None,
                region: None,
                limit: 10,
            }),
        )
        .await
        .expect("list_lobbies blocked behind the row lock")
        .unwrap();
        assert_eq!(items.len(), 1);

        tx.commit().await.unwrap();
        let snapshot = store.find_lobby(lobby.id).await.unwrap().unwrap();
        assert_eq!(snapshot.active_count(), 2);
    }

    #[tokio::test]
    async fn failed_commit_publishes_nothing() {
        let store = MemoryLobbyStore::new();
        let (lobby, leader) = new_lobby(SystemTime::now());
        store.insert_lobby(lobby.clone(), leader.clone()).await.unwrap();

        let mut tx = store.begin(lobby.id).await.unwrap().unwrap();
        let mut closed = lobby.clone();
        closed.status = LobbyStatus::Closed;
        tx.stage_lobby(closed);
        let mut duplicate = member_of(&lobby);
        duplicate.user_id = leader.user_id;
        tx.stage_member(duplicate);
        assert!(tx.commit().await.is_err());

        let snapshot = store.find_lobby(lobby.id).await.unwrap().unwrap();
        assert_eq!(snapshot.lobby.status, LobbyStatus::Open);
    }
}
