use std::sync::Arc;

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, ready};

use crate::dao::{models::SessionEntity, session_store::SessionStore, storage::StorageResult};

/// Process-local store used for tests and single-node development runs.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    documents: Arc<DashMap<String, SessionEntity>>,
}

impl MemorySessionStore {
    /// Create an empty instance.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn find_session(
        &self,
        project_id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let found = self
            .documents
            .get(project_id)
            .map(|entry| entry.value().clone());
        ready(Ok(found)).boxed()
    }

    fn upsert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.documents.insert(session.project_id.clone(), session);
        ready(Ok(())).boxed()
    }

    fn delete_session(&self, project_id: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let deleted = self.documents.remove(project_id).is_some();
        ready(Ok(deleted)).boxed()
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        ready(Ok(())).boxed()
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        ready(Ok(())).boxed()
    }
}
