use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{session_store::SessionStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect the session store and keep the shared state in degraded mode while it is unavailable.
///
/// Runs forever: once a connected store exhausts its reconnect attempts the
/// supervisor falls back to `connect` with exponential backoff.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn SessionStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.set_session_store(store.clone()).await;
                info!("storage connection established; leaving degraded mode");
                delay = INITIAL_DELAY;

                watch_store(&state, store.as_ref()).await;
                warn!("exhausted storage reconnect attempts; staying in degraded mode");
            }
            Err(err) => warn!(error = %err, "storage connection attempt failed"),
        }

        sleep(delay).await;
        delay = (delay * 2).min(MAX_DELAY);
    }
}

/// Poll `store` until it fails and cannot be revived.
async fn watch_store(state: &SharedState, store: &dyn SessionStore) {
    loop {
        if store.health_check().await.is_ok() {
            if state.is_degraded().await {
                info!("storage healthy again; leaving degraded mode");
                state.update_degraded(false).await;
            }
            sleep(HEALTH_POLL_INTERVAL).await;
            continue;
        }

        if !reconnect(state, store).await {
            return;
        }
        state.update_degraded(false).await;
        sleep(HEALTH_POLL_INTERVAL).await;
    }
}

async fn reconnect(state: &SharedState, store: &dyn SessionStore) -> bool {
    let mut reconnect_delay = INITIAL_DELAY;

    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnection succeeded after health check failure");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(
                        attempt, error = %err,
                        "storage reconnect first attempt failed; entering degraded mode"
                    );
                    state.update_degraded(true).await;
                } else {
                    warn!(attempt, error = %err, "storage reconnect attempt failed");
                }
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use tokio::time::timeout;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{board_directory::MemoryBoardDirectory, session_store::memory::MemorySessionStore},
        state::AppState,
    };

    #[tokio::test]
    async fn installing_a_store_leaves_degraded_mode() {
        let state = AppState::new(AppConfig::default(), Arc::new(MemoryBoardDirectory::new()));
        let mut degraded = state.degraded_watcher();
        assert!(*degraded.borrow());

        let supervisor = tokio::spawn(run(state.clone(), || async {
            Ok(Arc::new(MemorySessionStore::new()) as Arc<dyn SessionStore>)
        }));

        timeout(Duration::from_secs(1), degraded.wait_for(|value| !*value))
            .await
            .unwrap()
            .unwrap();
        assert!(state.require_session_store().await.is_ok());
        supervisor.abort();
    }
}
