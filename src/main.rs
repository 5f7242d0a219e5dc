//! Planning-poker backend entrypoint wiring REST, SSE, storage and the board directory.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::{Context, bail};
use axum::Router;
use planning_poker_back::{
    config::AppConfig,
    dao::{
        board_directory::{BoardDirectory, HttpBoardDirectory, MemoryBoardDirectory},
        session_store::{SessionStore, memory::MemorySessionStore},
        storage::StorageError,
    },
    routes,
    services::storage_supervisor,
    state::{AppState, SharedState},
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let directory = board_directory()?;
    let app_state = AppState::new(config, directory);

    spawn_storage_supervisor(app_state.clone())?;
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

/// HTTP board directory when `BOARDS_API_URL` is set, an empty in-memory one otherwise.
fn board_directory() -> anyhow::Result<Arc<dyn BoardDirectory>> {
    match HttpBoardDirectory::from_env() {
        Some(directory) => {
            let directory = directory.context("configuring board directory")?;
            Ok(Arc::new(directory))
        }
        None => {
            warn!("BOARDS_API_URL not set; using an empty in-memory board directory");
            Ok(Arc::new(MemoryBoardDirectory::new()))
        }
    }
}

/// Start the background task that installs the configured session store.
fn spawn_storage_supervisor(state: SharedState) -> anyhow::Result<()> {
    let backend = env::var("STORAGE_BACKEND").unwrap_or_else(|_| "mongo".into());
    info!(backend = %backend, "selecting session storage backend");

    match backend.as_str() {
        #[cfg(feature = "mongo-store")]
        "mongo" => {
            tokio::spawn(storage_supervisor::run(state, connect_mongo));
        }
        #[cfg(feature = "couch-store")]
        "couch" => {
            tokio::spawn(storage_supervisor::run(state, connect_couch));
        }
        "memory" => {
            tokio::spawn(storage_supervisor::run(state, connect_memory));
        }
        other => bail!("unsupported STORAGE_BACKEND `{other}`"),
    }
    Ok(())
}

#[cfg(feature = "mongo-store")]
async fn connect_mongo() -> Result<Arc<dyn SessionStore>, StorageError> {
    use planning_poker_back::dao::session_store::mongodb::{MongoConfig, MongoSessionStore};

    let config = MongoConfig::from_env().await?;
    let store = MongoSessionStore::connect(config).await?;
    Ok(Arc::new(store))
}

#[cfg(feature = "couch-store")]
async fn connect_couch() -> Result<Arc<dyn SessionStore>, StorageError> {
    use planning_poker_back::dao::session_store::couchdb::{CouchConfig, CouchSessionStore};

    let config = CouchConfig::from_env()?;
    let store = CouchSessionStore::connect(config).await?;
    Ok(Arc::new(store))
}

async fn connect_memory() -> Result<Arc<dyn SessionStore>, StorageError> {
    Ok(Arc::new(MemorySessionStore::new()))
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

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
