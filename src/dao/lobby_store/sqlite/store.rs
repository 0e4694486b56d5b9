use std::{
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
};

use futures::future::BoxFuture;
use sqlx::{
    QueryBuilder, Sqlite, SqlitePool, Transaction,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use tracing::info;
use uuid::Uuid;

use super::{
    config::SqliteConfig,
    error::{SqliteDaoError, SqliteResult},
    rows::{LOBBY_COLUMNS, MEMBER_COLUMNS, lobby_from_row, member_from_row, to_millis},
    schema,
};
use crate::dao::{
    lobby_store::{LobbyStore, LobbyTransaction},
    models::{LobbyEntity, LobbyFilter, LobbyListItemEntity, LobbyMemberEntity, LobbySnapshot},
    storage::StorageResult,
};

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Lobby store backed by SQLite through a `sqlx` pool.
#[derive(Clone)]
pub struct SqliteLobbyStore {
    pool: SqlitePool,
}

impl SqliteLobbyStore {
    /// Open the database, apply pending migrations, and return a ready store.
    pub async fn connect(config: SqliteConfig) -> SqliteResult<Self> {
        let connect_err = |source| SqliteDaoError::Connect {
            url: config.url.clone(),
            source,
        };

        let (options, max_connections) = if config.is_memory() {
            // Every pooled connection must see the same database, so use a
            // uniquely named shared-cache memory database behind one connection.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let uri = format!(
                "file:squad-lobby-memdb-{}-{id}?mode=memory&cache=shared",
                std::process::id()
            );
            let options = SqliteConnectOptions::new()
                .filename(&uri)
                .shared_cache(true)
                .create_if_missing(true);
            (options, 1)
        } else {
            let options = SqliteConnectOptions::from_str(&config.url)
                .map_err(connect_err)?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal);
            (options, config.max_connections)
        };

        let options = options
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(connect_err)?;

        schema::migrate(&pool).await?;
        info!(url = %config.url, "SQLite lobby store ready");

        Ok(Self { pool })
    }

    async fn insert(&self, lobby: LobbyEntity, leader: LobbyMemberEntity) -> SqliteResult<()> {
        let id = lobby.id;
        let insert_err = |source| SqliteDaoError::InsertLobby { id, source };

        let mut tx = self.pool.begin().await.map_err(insert_err)?;
        sqlx::query(&format!(
            "INSERT INTO lobbies ({LOBBY_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(lobby.id.to_string())
        .bind(lobby.owner_id.to_string())
        .bind(lobby.game_id.to_string())
        .bind(&lobby.title)
        .bind(&lobby.description)
        .bind(&lobby.language)
        .bind(&lobby.region)
        .bind(i64::from(lobby.max_players))
        .bind(lobby.status.as_str())
        .bind(to_millis(lobby.created_at))
        .bind(to_millis(lobby.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(insert_err)?;

        upsert_member(&mut tx, &leader).await?;
        tx.commit().await.map_err(insert_err)?;
        Ok(())
    }

    async fn open(&self, id: Uuid) -> SqliteResult<Option<SqliteTransaction>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|source| SqliteDaoError::LockLobby { id, source })?;

        // Writing to the lobby row first takes SQLite's write lock, so
        // concurrent transactions on any lobby queue here before reading.
        let touched = sqlx::query("UPDATE lobbies SET updated_at = updated_at WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|source| SqliteDaoError::LockLobby { id, source })?;
        if touched.rows_affected() == 0 {
            return Ok(None);
        }

        let Some(snapshot) = load_snapshot(&mut tx, id).await? else {
            return Ok(None);
        };

        Ok(Some(SqliteTransaction {
            tx,
            snapshot,
            staged_lobby: None,
            staged_members: Vec::new(),
        }))
    }

    async fn find(&self, id: Uuid) -> SqliteResult<Option<LobbySnapshot>> {
        // Lobby and member rows are read from one snapshot.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|source| SqliteDaoError::LoadLobby { id, source })?;
        let snapshot = load_snapshot(&mut tx, id).await?;
        tx.rollback()
            .await
            .map_err(|source| SqliteDaoError::LoadLobby { id, source })?;
        Ok(snapshot)
    }

    async fn list(&self, filter: LobbyFilter) -> SqliteResult<Vec<LobbyListItemEntity>> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {LOBBY_COLUMNS}, \
             (SELECT COUNT(*) FROM lobby_members m WHERE m.lobby_id = lobbies.id AND m.status = 'ACTIVE') AS active_count \
             FROM lobbies WHERE status IN ("
        ));
        let mut statuses = builder.separated(", ");
        for status in &filter.statuses {
            statuses.push_bind(status.as_str());
        }
        statuses.push_unseparated(")");

        if let Some(game_id) = filter.game_id {
            builder.push(" AND game_id = ").push_bind(game_id.to_string());
        }
        if let Some(language) = &filter.language {
            builder.push(" AND language = ").push_bind(language.clone());
        }
        if let Some(region) = &filter.region {
            builder.push(" AND region = ").push_bind(region.clone());
        }
        builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(i64::try_from(filter.limit).unwrap_or(i64::MAX));

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|source| SqliteDaoError::ListLobbies { source })?;

        rows.iter()
            .map(|row| -> SqliteResult<LobbyListItemEntity> {
                let active_count: i64 = sqlx::Row::try_get(row, "active_count").map_err(|err| {
                    SqliteDaoError::Decode {
                        table: "lobbies",
                        message: format!("column `active_count`: {err}"),
                    }
                })?;
                Ok(LobbyListItemEntity {
                    lobby: lobby_from_row(row)?,
                    active_count: usize::try_from(active_count).unwrap_or(0),
                })
            })
            .collect()
    }

    async fn ping(&self) -> SqliteResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|source| SqliteDaoError::HealthPing { source })?;
        Ok(())
    }
}

async fn load_snapshot(
    conn: &mut sqlx::SqliteConnection,
    id: Uuid,
) -> SqliteResult<Option<LobbySnapshot>> {
    let load_err = |source| SqliteDaoError::LoadLobby { id, source };

    let row = sqlx::query(&format!("SELECT {LOBBY_COLUMNS} FROM lobbies WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(load_err)?;
    let Some(row) = row else {
        return Ok(None);
    };
    let lobby = lobby_from_row(&row)?;

    let members = sqlx::query(&format!(
        "SELECT {MEMBER_COLUMNS} FROM lobby_members WHERE lobby_id = ? ORDER BY joined_at"
    ))
    .bind(id.to_string())
    .fetch_all(&mut *conn)
    .await
    .map_err(load_err)?
    .iter()
    .map(member_from_row)
    .collect::<SqliteResult<Vec<_>>>()?;

    Ok(Some(LobbySnapshot { lobby, members }))
}

async fn upsert_member(
    conn: &mut sqlx::SqliteConnection,
    member: &LobbyMemberEntity,
) -> SqliteResult<()> {
    sqlx::query(&format!(
        "INSERT INTO lobby_members ({MEMBER_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (id) DO UPDATE SET role = excluded.role, status = excluded.status, \
         joined_at = excluded.joined_at, updated_at = excluded.updated_at"
    ))
    .bind(member.id.to_string())
    .bind(member.lobby_id.to_string())
    .bind(member.user_id.to_string())
    .bind(member.role.as_str())
    .bind(member.status.as_str())
    .bind(to_millis(member.joined_at))
    .bind(to_millis(member.updated_at))
    .execute(&mut *conn)
    .await
    .map_err(|source| SqliteDaoError::SaveMember {
        id: member.id,
        source,
    })?;
    Ok(())
}

async fn update_lobby(conn: &mut sqlx::SqliteConnection, lobby: &LobbyEntity) -> SqliteResult<()> {
    sqlx::query(
        "UPDATE lobbies SET title = ?, description = ?, language = ?, region = ?, \
         max_players = ?, status = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&lobby.title)
    .bind(&lobby.description)
    .bind(&lobby.language)
    .bind(&lobby.region)
    .bind(i64::from(lobby.max_players))
    .bind(lobby.status.as_str())
    .bind(to_millis(lobby.updated_at))
    .bind(lobby.id.to_string())
    .execute(&mut *conn)
    .await
    .map_err(|source| SqliteDaoError::SaveLobby {
        id: lobby.id,
        source,
    })?;
    Ok(())
}

struct SqliteTransaction {
    tx: Transaction<'static, Sqlite>,
    snapshot: LobbySnapshot,
    staged_lobby: Option<LobbyEntity>,
    staged_members: Vec<LobbyMemberEntity>,
}

impl SqliteTransaction {
    async fn finish(mut self) -> SqliteResult<()> {
        let id = self.snapshot.lobby.id;
        for member in &self.staged_members {
            upsert_member(&mut self.tx, member).await?;
        }
        if let Some(lobby) = &self.staged_lobby {
            update_lobby(&mut self.tx, lobby).await?;
        }
        self.tx
            .commit()
            .await
            .map_err(|source| SqliteDaoError::Commit { id, source })
    }
}

impl LobbyTransaction for SqliteTransaction {
    fn snapshot(&self) -> &LobbySnapshot {
        &self.snapshot
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
        Box::pin(async move { self.finish().await.map_err(Into::into) })
    }
}

impl LobbyStore for SqliteLobbyStore {
    fn insert_lobby(
        &self,
        lobby: LobbyEntity,
        leader: LobbyMemberEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert(lobby, leader).await.map_err(Into::into) })
    }

    fn begin(
        &self,
        lobby_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<Box<dyn LobbyTransaction>>>> {
        let store = self.clone();
        Box::pin(async move {
            let tx = store.open(lobby_id).await?;
            Ok(tx.map(|tx| Box::new(tx) as Box<dyn LobbyTransaction>))
        })
    }

    fn find_lobby(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<LobbySnapshot>>> {
        let store = self.clone();
        Box::pin(async move { store.find(id).await.map_err(Into::into) })
    }

    fn list_lobbies(
        &self,
        filter: LobbyFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<LobbyListItemEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list(filter).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }
}
