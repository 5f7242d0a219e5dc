//! Failures of the CouchDB session store.

use reqwest::StatusCode;
use thiserror::Error;

/// Result alias for CouchDB session store operations.
pub type CouchResult<T> = Result<T, CouchDaoError>;

/// Everything that can go wrong between the session store and CouchDB.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    /// A variable needed to reach the server is not set.
    #[error("missing CouchDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    /// `COUCH_BASE_URL` is not an absolute URL that can carry a path.
    #[error("invalid CouchDB base URL `{url}`")]
    InvalidBaseUrl { url: String },
    #[error("failed to build CouchDB HTTP client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// The server root did not answer the liveness ping.
    #[error("CouchDB server at `{url}` is unreachable")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// The server root answered the liveness ping with an error.
    #[error("CouchDB server at `{url}` answered ping with {status}")]
    PingStatus { url: String, status: StatusCode },
    /// Looking up or creating the sessions database could not be sent.
    #[error("failed to {action} CouchDB sessions database `{database}`")]
    Database {
        database: String,
        action: &'static str,
        #[source]
        source: reqwest::Error,
    },
    /// The sessions database could neither be found nor created.
    #[error("CouchDB sessions database `{database}` unavailable: {status}")]
    DatabaseStatus {
        database: String,
        status: StatusCode,
    },
    /// A request for a session document could not be sent.
    #[error("failed to reach session document `{document}`")]
    DocumentRequest {
        document: String,
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB refused a session document request; 409 marks a revision race.
    #[error("session document `{document}` request failed with {status}")]
    DocumentStatus {
        document: String,
        status: StatusCode,
    },
    /// A stored session document does not match the expected layout.
    #[error("session document `{document}` could not be decoded")]
    DecodeDocument {
        document: String,
        #[source]
        source: reqwest::Error,
    },
}
