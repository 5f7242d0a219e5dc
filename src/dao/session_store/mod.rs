/// CouchDB backend.
#[cfg(feature = "couch-store")]
pub mod couchdb;
/// In-process backend.
pub mod memory;
/// MongoDB backend.
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::SessionEntity;
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;

/// Abstraction over the persistence layer for planning-poker session documents.
///
/// Implementations create their schema lazily on first use and key documents
/// by project identifier.
pub trait SessionStore: Send + Sync {
    /// Load the document keyed by `project_id`.
    fn find_session(&self, project_id: &str)
    -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Insert or replace the document of `session.project_id`.
    fn upsert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Remove the document, reporting whether one existed.
    fn delete_session(&self, project_id: &str) -> BoxFuture<'static, StorageResult<bool>>;
    /// Cheap round trip proving the backend answers.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
