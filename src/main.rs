//! Squad lobby binary entrypoint wiring REST, SSE and the lobby store.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use squad_lobby::{
    config::AppConfig,
    dao::{
        lobby_store::{LobbyStore, MemoryLobbyStore},
        storage::StorageError,
    },
    routes,
    services::{sse_service, storage_supervisor},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let app_state = AppState::new(config);
    sse_service::spawn_degraded_broadcaster(app_state.clone());

    let database_url = env::var("DATABASE_URL")
        .ok()
        .filter(|value| !value.trim().is_empty());
    spawn_storage(app_state.clone(), database_url);

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Start the storage supervisor for the selected backend.
fn spawn_storage(state: SharedState, database_url: Option<String>) {
    match database_url {
        #[cfg(feature = "sqlite-store")]
        Some(url) => {
            use squad_lobby::dao::lobby_store::sqlite::{SqliteConfig, SqliteLobbyStore};

            info!("using SQLite lobby store");
            tokio::spawn(storage_supervisor::run(state, move || {
                let config = SqliteConfig::new(url.clone());
                async move {
                    let store = SqliteLobbyStore::connect(config)
                        .await
                        .map_err(StorageError::from)?;
                    Ok::<_, StorageError>(Arc::new(store) as Arc<dyn LobbyStore>)
                }
            }));
        }
        #[cfg(not(feature = "sqlite-store"))]
        Some(_) => {
            tracing::warn!("DATABASE_URL set but SQLite support is disabled; using in-memory store");
            spawn_memory_store(state);
        }
        None => {
            info!("DATABASE_URL not set; using in-memory lobby store");
            spawn_memory_store(state);
        }
    }
}

fn spawn_memory_store(state: SharedState) {
    let store: Arc<dyn LobbyStore> = Arc::new(MemoryLobbyStore::new());
    tokio::spawn(storage_supervisor::run(state, move || {
        let store = store.clone();
        async move { Ok::<_, StorageError>(store) }
    }));
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
