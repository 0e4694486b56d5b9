pub mod membership;
mod sse;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::lobby_store::LobbyStore,
    error::ServiceError,
    services::{
        game_catalog::{self, GameCatalog},
        identity::{self, IdentityProvider},
        membership_service::{EngineSettings, MembershipEngine},
        notification::{LobbyNotifier, SseNotifier},
    },
};

pub use self::sse::SseHub;

pub type SharedState = Arc<AppState>;

/// Central application state: the installed lobby store, the SSE hub, and the
/// collaborators every request needs.
pub struct AppState {
    lobby_store: RwLock<Option<Arc<dyn LobbyStore>>>,
    sse: SseHub,
    degraded: watch::Sender<bool>,
    config: Arc<AppConfig>,
    notifier: Arc<dyn LobbyNotifier>,
    identity: Arc<dyn IdentityProvider>,
    catalog: Arc<dyn GameCatalog>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let sse = SseHub::new(config.sse_capacity);
        let notifier: Arc<dyn LobbyNotifier> = Arc::new(SseNotifier::new(sse.clone()));
        Self::with_notifier(config, sse, notifier)
    }

    /// Same as [`AppState::new`] with a custom notification transport.
    pub fn with_notifier(
        config: AppConfig,
        sse: SseHub,
        notifier: Arc<dyn LobbyNotifier>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            lobby_store: RwLock::new(None),
            identity: identity::from_settings(&config.identity),
            catalog: game_catalog::from_settings(config.games.as_deref()),
            sse,
            degraded: degraded_tx,
            config: Arc::new(config),
            notifier,
        })
    }

    /// Obtain a handle to the current lobby store, if one is installed.
    pub async fn lobby_store(&self) -> Option<Arc<dyn LobbyStore>> {
        let guard = self.lobby_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current lobby store, or [`ServiceError::Degraded`] when none is usable.
    pub async fn require_lobby_store(&self) -> Result<Arc<dyn LobbyStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.lobby_store().await.ok_or(ServiceError::Degraded)
    }

    /// Membership engine bound to the current store.
    pub async fn membership_engine(&self) -> Result<MembershipEngine, ServiceError> {
        let store = self.require_lobby_store().await?;
        Ok(MembershipEngine::new(
            store,
            self.notifier.clone(),
            self.catalog.clone(),
            EngineSettings::from(self.config.as_ref()),
        ))
    }

    /// Install a new lobby store implementation and leave degraded mode.
    pub async fn set_lobby_store(&self, store: Arc<dyn LobbyStore>) {
        {
            let mut guard = self.lobby_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current lobby store and enter degraded mode.
    pub async fn clear_lobby_store(&self) {
        {
            let mut guard = self.lobby_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Broadcast hub used for the lobby SSE streams.
    pub fn lobby_sse(&self) -> &SseHub {
        &self.sse
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn identity(&self) -> &dyn IdentityProvider {
        self.identity.as_ref()
    }
}
