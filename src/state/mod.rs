/// Live connection tracking.
pub mod connections;
/// Session entity and domain operations.
pub mod session;
mod sse;
/// Phase transitions.
pub mod state_machine;
/// Per-project timers.
pub mod timers;
pub mod vote_stats;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, watch};

use crate::{
    config::AppConfig,
    dao::{board_directory::BoardDirectory, session::SessionRepository, session_store::SessionStore},
    error::ServiceError,
};

pub use self::sse::SseTopics;
use self::{connections::ConnectionRegistry, timers::TimerScheduler};

/// Cheaply clonable handle to [`AppState`].
pub type SharedState = Arc<AppState>;

/// Central application state: storage handle, collaborators, timers and live connections.
pub struct AppState {
    session_store: RwLock<Option<Arc<dyn SessionStore>>>,
    degraded: watch::Sender<bool>,
    config: AppConfig,
    directory: Arc<dyn BoardDirectory>,
    sse: SseTopics,
    connections: ConnectionRegistry,
    timers: TimerScheduler,
    /// One async mutex per project serializing read-modify-write cycles.
    project_gates: DashMap<String, Arc<Mutex<()>>>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, directory: Arc<dyn BoardDirectory>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let sse = SseTopics::new(config.broadcast_capacity);
        Arc::new(Self {
            session_store: RwLock::new(None),
            degraded: degraded_tx,
            config,
            directory,
            sse,
            connections: ConnectionRegistry::new(),
            timers: TimerScheduler::new(),
            project_gates: DashMap::new(),
        })
    }

    /// Install a session store implementation and leave degraded mode.
    pub async fn set_session_store(&self, store: Arc<dyn SessionStore>) {
        {
            let mut guard = self.session_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Current store, or [`ServiceError::Degraded`] while storage is unavailable.
    pub async fn require_session_store(&self) -> Result<Arc<dyn SessionStore>, ServiceError> {
        if self.is_degraded().await {
            return Err(ServiceError::Degraded);
        }
        let guard = self.session_store.read().await;
        guard.as_ref().cloned().ok_or(ServiceError::Degraded)
    }

    /// Repository over the installed store.
    pub async fn sessions(&self) -> Result<SessionRepository, ServiceError> {
        self.require_session_store()
            .await
            .map(SessionRepository::new)
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Card domain and board membership collaborator.
    pub fn directory(&self) -> &Arc<dyn BoardDirectory> {
        &self.directory
    }

    /// Per-topic SSE hubs.
    pub fn sse(&self) -> &SseTopics {
        &self.sse
    }

    /// Live connections per project and user.
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Inactivity and finalization timers.
    pub fn timers(&self) -> &TimerScheduler {
        &self.timers
    }

    /// Wait for exclusive access to `project_id`.
    ///
    /// Held across the whole load, mutate, persist and broadcast cycle of
    /// both requests and timer callbacks. The gate is dropped from the map
    /// once its last holder or waiter releases it.
    pub async fn lock_project(&self, project_id: &str) -> ProjectGate<'_> {
        let gate = self
            .project_gates
            .entry(project_id.to_owned())
            .or_default()
            .clone();
        ProjectGate {
            guard: Some(gate.lock_owned().await),
            gates: &self.project_gates,
            project_id: project_id.to_owned(),
        }
    }

    /// Number of projects currently holding or awaiting a gate.
    pub fn open_gates(&self) -> usize {
        self.project_gates.len()
    }
}

/// Exclusive access to one project, released on drop.
pub struct ProjectGate<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    gates: &'a DashMap<String, Arc<Mutex<()>>>,
    project_id: String,
}

impl Drop for ProjectGate<'_> {
    fn drop(&mut self) {
        // Unlock first so our clone no longer counts towards the strong count.
        drop(self.guard.take());
        self.gates
            .remove_if(&self.project_id, |_, gate| Arc::strong_count(gate) == 1);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::{sleep, timeout};

    use super::*;
    use crate::dao::{
        board_directory::MemoryBoardDirectory, session_store::memory::MemorySessionStore,
    };

    fn state() -> SharedState {
        AppState::new(AppConfig::default(), Arc::new(MemoryBoardDirectory::new()))
    }

    #[tokio::test]
    async fn starts_degraded_until_a_store_is_installed() {
        let state = state();
        assert!(matches!(
            state.require_session_store().await,
            Err(ServiceError::Degraded)
        ));

        state
            .set_session_store(Arc::new(MemorySessionStore::new()))
            .await;
        assert!(state.require_session_store().await.is_ok());

        state.update_degraded(true).await;
        assert!(matches!(state.sessions().await, Err(ServiceError::Degraded)));
    }

    #[tokio::test]
    async fn project_gates_are_independent() {
        let state = state();
        let _first = state.lock_project("p1").await;

        let other = timeout(Duration::from_millis(50), state.lock_project("p2")).await;
        assert!(other.is_ok());

        let same = timeout(Duration::from_millis(50), state.lock_project("p1")).await;
        assert!(same.is_err());
    }

    #[tokio::test]
    async fn released_gates_leave_the_map() {
        let state = state();
        for index in 0..100 {
            let _gate = state.lock_project(&format!("p{index}")).await;
        }
        assert_eq!(state.open_gates(), 0);
    }

    #[tokio::test]
    async fn gate_survives_while_a_waiter_holds_it() {
        let state = state();
        let first = state.lock_project("p1").await;

        let waiter = {
            let state = state.clone();
            tokio::spawn(async move {
                let _second = state.lock_project("p1").await;
            })
        };
        tokio::task::yield_now().await;
        sleep(Duration::from_millis(20)).await;

        drop(first);
        assert_eq!(state.open_gates(), 1);
        timeout(Duration::from_millis(200), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.open_gates(), 0);
    }
}
