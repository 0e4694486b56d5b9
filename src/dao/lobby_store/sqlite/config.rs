use std::time::Duration;

/// Connection settings for the SQLite lobby store.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Either a path, a `sqlite:` URL, or `:memory:`.
    pub url: String,
    pub max_connections: u32,
    /// How long a writer waits on SQLite's lock before reporting busy.
    pub busy_timeout: Duration,
    /// How long a caller waits for a pooled connection.
    pub acquire_timeout: Duration,
}

impl SqliteConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(5),
        }
    }

    pub(super) fn is_memory(&self) -> bool {
        matches!(self.url.as_str(), ":memory:" | "sqlite::memory:")
    }
}
