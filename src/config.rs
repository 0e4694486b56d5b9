//! Application-level configuration loading: membership policy, timeouts, retry budget,
//! listing bounds, identity mode and the game catalog.

use std::{collections::HashMap, env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::membership::LeaderDeparture;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "SQUAD_LOBBY_CONFIG_PATH";
/// Header carrying the caller's user id when no identity section is configured.
pub const DEFAULT_IDENTITY_HEADER: &str = "x-user-id";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// What happens when the leader leaves a populated lobby.
    pub leader_departure: LeaderDeparture,
    /// Upper bound for one membership transaction, lock wait included.
    pub store_timeout: Duration,
    /// Upper bound for publishing one notification.
    pub notify_timeout: Duration,
    pub retry: RetrySettings,
    pub listing: ListingSettings,
    pub identity: IdentitySettings,
    /// Known game ids; `None` accepts any id.
    pub games: Option<Vec<Uuid>>,
    /// Capacity of the SSE broadcast channel.
    pub sse_capacity: usize,
}

/// Bounded retry applied by the command surface on transient store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    /// Total attempts, first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

/// Page size bounds for the lobby listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingSettings {
    pub default_limit: usize,
    pub max_limit: usize,
}

/// How the caller's identity is established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySettings {
    /// Trust a header set by an upstream authenticating proxy.
    Header { name: String },
    /// Map bearer tokens to user ids.
    Tokens { tokens: HashMap<String, Uuid> },
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        leader_departure = ?app_config.leader_departure,
                        games = app_config.games.as_ref().map_or(0, Vec::len),
                        "loaded lobby configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a JSON document. Missing keys take their default value.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    leader_departure: LeaderDeparture,
    store_timeout_ms: u64,
    notify_timeout_ms: u64,
    retry: RawRetry,
    listing: RawListing,
    identity: RawIdentity,
    games: Option<Vec<Uuid>>,
    sse_capacity: usize,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            leader_departure: LeaderDeparture::default(),
            store_timeout_ms: 2_000,
            notify_timeout_ms: 500,
            retry: RawRetry::default(),
            listing: RawListing::default(),
            identity: RawIdentity::default(),
            games: None,
            sse_capacity: 64,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawRetry {
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl Default for RawRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 50,
            max_delay_ms: 1_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawListing {
    default_limit: usize,
    max_limit: usize,
}

impl Default for RawListing {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 100,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
enum RawIdentity {
    Header {
        #[serde(default = "default_identity_header")]
        header: String,
    },
    Tokens {
        tokens: HashMap<String, Uuid>,
    },
}

impl Default for RawIdentity {
    fn default() -> Self {
        RawIdentity::Header {
            header: default_identity_header(),
        }
    }
}

fn default_identity_header() -> String {
    DEFAULT_IDENTITY_HEADER.into()
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let max_limit = value.listing.max_limit.max(1);
        let max_delay = Duration::from_millis(value.retry.max_delay_ms);
        Self {
            leader_departure: value.leader_departure,
            store_timeout: Duration::from_millis(value.store_timeout_ms.max(1)),
            notify_timeout: Duration::from_millis(value.notify_timeout_ms.max(1)),
            retry: RetrySettings {
                max_attempts: value.retry.max_attempts.max(1),
                base_delay: Duration::from_millis(value.retry.base_delay_ms).min(max_delay),
                max_delay,
            },
            listing: ListingSettings {
                default_limit: value.listing.default_limit.clamp(1, max_limit),
                max_limit,
            },
            identity: match value.identity {
                RawIdentity::Header { header } => IdentitySettings::Header {
                    name: header.to_ascii_lowercase(),
                },
                RawIdentity::Tokens { tokens } => IdentitySettings::Tokens { tokens },
            },
            games: value.games,
            sse_capacity: value.sse_capacity.max(1),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
