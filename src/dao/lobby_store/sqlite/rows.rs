use std::{
    str::FromStr,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use sqlx::{Row, sqlite::SqliteRow};
use uuid::Uuid;

use super::error::{SqliteDaoError, SqliteResult};
use crate::dao::models::{LobbyEntity, LobbyMemberEntity};

pub const LOBBY_COLUMNS: &str = "id, owner_id, game_id, title, description, language, region, \
     max_players, status, created_at, updated_at";
pub const MEMBER_COLUMNS: &str = "id, lobby_id, user_id, role, status, joined_at, updated_at";

/// Timestamps are stored as milliseconds since the Unix epoch.
pub fn to_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

pub fn from_millis(millis: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(u64::try_from(millis).unwrap_or(0))
}

fn column<T>(row: &SqliteRow, table: &'static str, name: &str) -> SqliteResult<T>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name).map_err(|err| SqliteDaoError::Decode {
        table,
        message: format!("column `{name}`: {err}"),
    })
}

fn parsed<T>(row: &SqliteRow, table: &'static str, name: &str) -> SqliteResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = column(row, table, name)?;
    raw.parse().map_err(|err: T::Err| SqliteDaoError::Decode {
        table,
        message: format!("column `{name}`: {err}"),
    })
}

pub fn lobby_from_row(row: &SqliteRow) -> SqliteResult<LobbyEntity> {
    const TABLE: &str = "lobbies";
    let max_players: i64 = column(row, TABLE, "max_players")?;

    Ok(LobbyEntity {
        id: parsed::<Uuid>(row, TABLE, "id")?,
        owner_id: parsed::<Uuid>(row, TABLE, "owner_id")?,
        game_id: parsed::<Uuid>(row, TABLE, "game_id")?,
        title: column(row, TABLE, "title")?,
        description: column(row, TABLE, "description")?,
        language: column(row, TABLE, "language")?,
        region: column(row, TABLE, "region")?,
        max_players: u8::try_from(max_players).map_err(|_| SqliteDaoError::Decode {
            table: TABLE,
            message: format!("max_players out of range: {max_players}"),
        })?,
        status: parsed(row, TABLE, "status")?,
        created_at: from_millis(column(row, TABLE, "created_at")?),
        updated_at: from_millis(column(row, TABLE, "updated_at")?),
    })
}

pub fn member_from_row(row: &SqliteRow) -> SqliteResult<LobbyMemberEntity> {
    const TABLE: &str = "lobby_members";

    Ok(LobbyMemberEntity {
        id: parsed::<Uuid>(row, TABLE, "id")?,
        lobby_id: parsed::<Uuid>(row, TABLE, "lobby_id")?,
        user_id: parsed::<Uuid>(row, TABLE, "user_id")?,
        role: parsed(row, TABLE, "role")?,
        status: parsed(row, TABLE, "status")?,
        joined_at: from_millis(column(row, TABLE, "joined_at")?),
        updated_at: from_millis(column(row, TABLE, "updated_at")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_conversion_is_stable() {
        let time = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        assert_eq!(from_millis(to_millis(time)), time);
    }

    #[test]
    fn pre_epoch_times_clamp_to_epoch() {
        assert_eq!(from_millis(-5), UNIX_EPOCH);
    }
}
