//! Versioned schema for the lobby tables, tracked through `PRAGMA user_version`.

use sqlx::SqlitePool;
use tracing::info;

use super::error::{SqliteDaoError, SqliteResult};

struct Migration {
    version: u32,
    description: &'static str,
    statements: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "lobbies and lobby_members",
    statements: &[
        r#"
        CREATE TABLE IF NOT EXISTS lobbies (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            game_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            language TEXT,
            region TEXT,
            max_players INTEGER NOT NULL CHECK (max_players BETWEEN 2 AND 16),
            status TEXT NOT NULL CHECK (status IN ('OPEN', 'FULL', 'CLOSED')),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS lobby_members (
            id TEXT PRIMARY KEY,
            lobby_id TEXT NOT NULL REFERENCES lobbies(id),
            user_id TEXT NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('LEADER', 'MEMBER')),
            status TEXT NOT NULL CHECK (status IN ('ACTIVE', 'LEFT', 'KICKED')),
            joined_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE (lobby_id, user_id)
        )
        "#,
        "CREATE INDEX IF NOT EXISTS lobbies_status_created_idx ON lobbies (status, created_at DESC)",
        "CREATE INDEX IF NOT EXISTS lobby_members_lobby_status_idx ON lobby_members (lobby_id, status)",
    ],
}];

/// Apply every migration newer than the database's recorded version.
pub async fn migrate(pool: &SqlitePool) -> SqliteResult<()> {
    let current: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await
        .map_err(|source| SqliteDaoError::Migrate { version: 0, source })?;

    for migration in MIGRATIONS
        .iter()
        .filter(|migration| i64::from(migration.version) > current)
    {
        let version = migration.version;
        let mut tx = pool
            .begin()
            .await
            .map_err(|source| SqliteDaoError::Migrate { version, source })?;
        for statement in migration.statements {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|source| SqliteDaoError::Migrate { version, source })?;
        }
        // PRAGMA does not accept bound parameters.
        sqlx::query(&format!("PRAGMA user_version = {version}"))
            .execute(&mut *tx)
            .await
            .map_err(|source| SqliteDaoError::Migrate { version, source })?;
        tx.commit()
            .await
            .map_err(|source| SqliteDaoError::Migrate { version, source })?;

        info!(version, description = migration.description, "applied schema migration");
    }

    Ok(())
}
