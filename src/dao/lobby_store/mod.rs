pub mod memory;
#[cfg(feature = "sqlite-store")]
pub mod sqlite;

use crate::dao::models::{
    LobbyEntity, LobbyFilter, LobbyListItemEntity, LobbyMemberEntity, LobbySnapshot,
};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

pub use memory::MemoryLobbyStore;

/// Abstraction over the relational store holding lobbies and their membership rows.
///
/// Structural changes go through [`LobbyStore::begin`], which hands out a
/// transaction holding the lobby's exclusive lock. Reads are read-committed
/// and never take that lock.
pub trait LobbyStore: Send + Sync {
    /// Persist a new lobby and its leader row atomically.
    fn insert_lobby(
        &self,
        lobby: LobbyEntity,
        leader: LobbyMemberEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Open a transaction on `lobby_id`, lock the lobby row, and load its snapshot.
    ///
    /// Returns `None` when the lobby does not exist.
    fn begin(
        &self,
        lobby_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<Box<dyn LobbyTransaction>>>>;

    /// Load a lobby with all of its membership rows without locking.
    fn find_lobby(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<LobbySnapshot>>>;

    /// List lobbies matching `filter`, newest first.
    fn list_lobbies(
        &self,
        filter: LobbyFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<LobbyListItemEntity>>>;

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// An open transaction scoped to a single lobby.
///
/// Writes are staged and only become visible on [`LobbyTransaction::commit`].
/// Dropping the transaction without committing rolls everything back.
pub trait LobbyTransaction: Send {
    /// State of the lobby as read under the lock, before any staged write.
    fn snapshot(&self) -> &LobbySnapshot;

    /// Replace the lobby row on commit.
    fn stage_lobby(&mut self, lobby: LobbyEntity);

    /// Insert or replace a membership row (keyed by its id) on commit.
    fn stage_member(&mut self, member: LobbyMemberEntity);

    fn commit(self: Box<Self>) -> BoxFuture<'static, StorageResult<()>>;
}
