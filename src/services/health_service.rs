use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report whether the engine can serve requests, pinging storage on the way.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_session_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
                return HealthResponse::from_degraded(true);
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    HealthResponse::from_degraded(state.is_degraded().await)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{board_directory::MemoryBoardDirectory, session_store::memory::MemorySessionStore},
        state::AppState,
    };

    #[tokio::test]
    async fn reports_degraded_until_storage_is_installed() {
        let state = AppState::new(AppConfig::default(), Arc::new(MemoryBoardDirectory::new()));
        assert_eq!(health_status(&state).await.status, "degraded");

        state
            .set_session_store(Arc::new(MemorySessionStore::new()))
            .await;
        let health = health_status(&state).await;
        assert_eq!(health.status, "ok");
        assert!(!health.degraded);
    }
}
