use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{lobby_store::LobbyStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECOVERY_ATTEMPTS: u32 = 3;

/// Keep a lobby store installed, entering degraded mode whenever it is unreachable.
///
/// A failed health check flips the state to degraded and re-probes the same
/// store with backoff; once the budget is spent the store is dropped and a
/// fresh one is requested from `connect`.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn LobbyStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.set_lobby_store(store.clone()).await;
                info!("storage connection established; leaving degraded mode");
                delay = INITIAL_DELAY;

                watch_store(&state, store.as_ref()).await;

                warn!("exhausted storage recovery attempts; reconnecting");
                state.clear_lobby_store().await;
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

/// Poll the store until it stays unhealthy for [`MAX_RECOVERY_ATTEMPTS`] probes.
async fn watch_store(state: &SharedState, store: &dyn LobbyStore) {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded() {
                    info!("storage healthy again; leaving degraded mode");
                    state.update_degraded(false);
                }
                sleep(HEALTH_POLL_INTERVAL).await;
            }
            Err(err) => {
                warn!(error = %err, "storage health check failed; entering degraded mode");
                state.update_degraded(true);

                let mut attempt = 0;
                let mut probe_delay = INITIAL_DELAY;
                let mut recovered = false;
                while attempt < MAX_RECOVERY_ATTEMPTS {
                    sleep(probe_delay).await;
                    match store.health_check().await {
                        Ok(()) => {
                            info!(attempt, "storage recovered after health check failure");
                            recovered = true;
                            break;
                        }
                        Err(err) => {
                            warn!(attempt, error = %err, "storage recovery probe failed");
                            attempt += 1;
                            probe_delay = (probe_delay * 2).min(MAX_DELAY);
                        }
                    }
                }

                if !recovered {
                    return;
                }
                state.update_degraded(false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, dao::lobby_store::MemoryLobbyStore, state::AppState};

    #[tokio::test]
    async fn installing_a_store_leaves_degraded_mode() {
        let state = AppState::new(AppConfig::default());
        let mut watcher = state.degraded_watcher();
        assert!(state.is_degraded());

        let supervisor = tokio::spawn(run(state.clone(), || async {
            Ok(Arc::new(MemoryLobbyStore::new()) as Arc<dyn LobbyStore>)
        }));

        watcher.changed().await.unwrap();
        assert!(!state.is_degraded());
        assert!(state.lobby_store().await.is_some());
        supervisor.abort();
    }
}
