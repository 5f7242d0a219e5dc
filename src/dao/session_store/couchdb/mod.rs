mod config;
mod error;
mod models;
mod store;

pub use config::CouchConfig;
pub use error::CouchDaoError;
pub use store::CouchSessionStore;

use reqwest::StatusCode;

use crate::dao::storage::StorageError;

const BACKEND: &str = "couchdb";

impl From<CouchDaoError> for StorageError {
    fn from(err: CouchDaoError) -> Self {
        match err {
            CouchDaoError::DocumentStatus { document, status } if status == StatusCode::CONFLICT => {
                StorageError::Conflict {
                    backend: BACKEND,
                    document,
                }
            }
            other => StorageError::unavailable(BACKEND, other),
        }
    }
}
