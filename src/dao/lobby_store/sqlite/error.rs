use thiserror::Error;
use uuid::Uuid;

pub type SqliteResult<T> = std::result::Result<T, SqliteDaoError>;

/// SQLite primary result codes that indicate lock contention.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

#[derive(Debug, Error)]
pub enum SqliteDaoError {
    #[error("failed to open SQLite database `{url}`")]
    Connect {
        url: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("failed to apply schema migration {version}")]
    Migrate {
        version: u32,
        #[source]
        source: sqlx::Error,
    },
    #[error("SQLite health check failed")]
    HealthPing {
        #[source]
        source: sqlx::Error,
    },
    #[error("failed to insert lobby `{id}`")]
    InsertLobby {
        id: Uuid,
        #[source]
        source: sqlx::Error,
    },
    #[error("failed to lock lobby `{id}`")]
    LockLobby {
        id: Uuid,
        #[source]
        source: sqlx::Error,
    },
    #[error("failed to load lobby `{id}`")]
    LoadLobby {
        id: Uuid,
        #[source]
        source: sqlx::Error,
    },
    #[error("failed to save lobby `{id}`")]
    SaveLobby {
        id: Uuid,
        #[source]
        source: sqlx::Error,
    },
    #[error("failed to save membership `{id}`")]
    SaveMember {
        id: Uuid,
        #[source]
        source: sqlx::Error,
    },
    #[error("failed to commit transaction on lobby `{id}`")]
    Commit {
        id: Uuid,
        #[source]
        source: sqlx::Error,
    },
    #[error("failed to list lobbies")]
    ListLobbies {
        #[source]
        source: sqlx::Error,
    },
    #[error("corrupt row in `{table}`: {message}")]
    Decode {
        table: &'static str,
        message: String,
    },
}

impl SqliteDaoError {
    fn driver_error(&self) -> Option<&sqlx::Error> {
        match self {
            SqliteDaoError::Connect { source, .. }
            | SqliteDaoError::Migrate { source, .. }
            | SqliteDaoError::HealthPing { source }
            | SqliteDaoError::InsertLobby { source, .. }
            | SqliteDaoError::LockLobby { source, .. }
            | SqliteDaoError::LoadLobby { source, .. }
            | SqliteDaoError::SaveLobby { source, .. }
            | SqliteDaoError::SaveMember { source, .. }
            | SqliteDaoError::Commit { source, .. }
            | SqliteDaoError::ListLobbies { source } => Some(source),
            SqliteDaoError::Decode { .. } => None,
        }
    }

    /// Busy or locked database, or no pooled connection within the acquire timeout.
    pub fn is_transient(&self) -> bool {
        match self.driver_error() {
            Some(sqlx::Error::PoolTimedOut) => true,
            Some(sqlx::Error::Database(db)) => db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED)),
            _ => false,
        }
    }

    /// Unique, foreign key, or check constraint violation.
    pub fn is_constraint(&self) -> bool {
        match self.driver_error() {
            Some(sqlx::Error::Database(db)) => {
                db.is_unique_violation()
                    || db.is_foreign_key_violation()
                    || db.is_check_violation()
            }
            _ => false,
        }
    }
}
