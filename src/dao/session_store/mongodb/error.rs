use mongodb::error::Error as MongoError;
use thiserror::Error;

/// Result alias for MongoDB session store operations.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures of the MongoDB session store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// `MONGO_URI` could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    /// The driver rejected the options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    /// The server never answered while connecting.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    /// A periodic ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    /// Creating the `board_id` index failed.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    /// Replacing a session document failed.
    #[error("failed to save planning-poker session for project `{project_id}`")]
    SaveSession {
        project_id: String,
        #[source]
        source: MongoError,
    },
    /// Reading a session document failed.
    #[error("failed to load planning-poker session for project `{project_id}`")]
    LoadSession {
        project_id: String,
        #[source]
        source: MongoError,
    },
    /// Deleting a session document failed.
    #[error("failed to delete planning-poker session for project `{project_id}`")]
    DeleteSession {
        project_id: String,
        #[source]
        source: MongoError,
    },
}
